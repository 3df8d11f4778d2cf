pub mod server;

use secrecy::SecretString;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        signing_key: SecretString,
        base_url: String,
        session_ttl: i64,
        token_ttl: i64,
    },
}
