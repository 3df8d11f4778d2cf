use crate::cli::actions::Action;
use anyhow::Result;
use secrecy::SecretString;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches
            .get_one("dsn")
            .map(|s: &String| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --dsn"))?,
        signing_key: matches
            .get_one("signing-key")
            .map(|s: &String| SecretString::from(s.as_str()))
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --signing-key"))?,
        base_url: matches
            .get_one("base-url")
            .map_or_else(|| "http://localhost:3000".to_string(), |s: &String| s.to_string()),
        session_ttl: matches.get_one::<i64>("session-ttl").copied().unwrap_or(7_200),
        token_ttl: matches.get_one::<i64>("token-ttl").copied().unwrap_or(86_400),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    #[test]
    fn handler_builds_server_action() {
        let matches = commands::new().get_matches_from(vec![
            "userauth",
            "--dsn",
            "postgres://localhost/userauth",
            "--signing-key",
            "secret",
            "--base-url",
            "https://auth.example.com",
        ]);

        let Action::Server {
            port,
            dsn,
            base_url,
            session_ttl,
            token_ttl,
            ..
        } = handler(&matches).unwrap();
        assert_eq!(port, 8080);
        assert_eq!(dsn, "postgres://localhost/userauth");
        assert_eq!(base_url, "https://auth.example.com");
        assert_eq!(session_ttl, 7_200);
        assert_eq!(token_ttl, 86_400);
    }
}
