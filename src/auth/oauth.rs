/// Provider redirect for the OAuth authorization-code flow
use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use url::Url;

use crate::config::OAuthConfig;

/// Where to send the browser, and the `state` it must come back with
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub url: Url,
    pub state: Option<String>,
}

impl AuthorizeRequest {
    pub fn new(config: &OAuthConfig) -> Result<Self> {
        if config.client_id.is_empty() {
            anyhow::bail!("OAuth client id is not configured (oauth.client_id / GH_OAUTH_CLIENT_ID)");
        }

        let mut url = Url::parse(&config.authorize_url)
            .with_context(|| format!("Invalid authorize URL: {}", config.authorize_url))?;

        let state = config.use_state.then(generate_state);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &config.client_id);
            if let Some(redirect_uri) = &config.redirect_uri {
                query.append_pair("redirect_uri", redirect_uri);
            }
            if let Some(state) = &state {
                query.append_pair("state", state);
            }
        }

        Ok(Self { url, state })
    }
}

/// Generate random state for CSRF protection
fn generate_state() -> String {
    use rand::RngCore;
    let mut rng = rand::thread_rng();
    let mut random_bytes = vec![0u8; 32];
    rng.fill_bytes(&mut random_bytes);
    URL_SAFE_NO_PAD.encode(random_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OAuthConfig {
        OAuthConfig {
            client_id: "Iv1.abc".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_authorize_url() {
        let request = AuthorizeRequest::new(&config()).unwrap();

        assert_eq!(
            request.url.as_str(),
            "https://github.com/login/oauth/authorize?client_id=Iv1.abc"
        );
        assert!(request.state.is_none());
    }

    #[test]
    fn test_authorize_url_with_redirect_and_state() {
        let config = OAuthConfig {
            redirect_uri: Some("http://127.0.0.1:5173/oauth".to_string()),
            use_state: true,
            ..config()
        };
        let request = AuthorizeRequest::new(&config).unwrap();
        let state = request.state.clone().unwrap();

        assert_eq!(state.len(), 43);
        let pairs: Vec<(String, String)> = request.url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("redirect_uri".to_string(), "http://127.0.0.1:5173/oauth".to_string())));
        assert!(pairs.contains(&("state".to_string(), state)));
    }

    #[test]
    fn test_states_are_random() {
        assert_ne!(generate_state(), generate_state());
    }

    #[test]
    fn test_missing_client_id() {
        assert!(AuthorizeRequest::new(&OAuthConfig::default()).is_err());
    }
}
