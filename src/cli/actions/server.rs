use crate::cli::actions::Action;
use crate::userauth::{new, AppConfig};
use anyhow::{Context, Result};
use url::Url;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            signing_key,
            base_url,
            session_ttl,
            token_ttl,
        } => {
            let base_url = Url::parse(&base_url)
                .with_context(|| format!("Invalid base URL: {base_url}"))?;

            let config = AppConfig::new(base_url, signing_key)
                .with_session_ttl_seconds(session_ttl)
                .with_token_ttl_seconds(token_ttl);

            new(port, dsn, config).await?;
        }
    }

    Ok(())
}
