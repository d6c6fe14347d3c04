use calendarlink::components::google_calendar::TokenManager;
use calendarlink::config::{Config, ProviderConfig};
use calendarlink::error::{auth_error, config_error, other_error, CalendarResult};
use std::env;
use url::Url;

/// Address the redirect URI points at
const CALLBACK_ADDR: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> miette::Result<()> {
    let account = env::args()
        .nth(1)
        .ok_or_else(|| config_error("Usage: authorize_google <account-name>"))?;

    let config = Config::load()?;
    let tokens = token_manager(&config, &account)?;

    // Generate random state for security
    let state = uuid::Uuid::new_v4().to_string();
    let auth_url = tokens.authorization_url(Some(&state))?;

    // Open browser for authorization
    println!("Opening browser for Google Calendar authorization of {}...", account);
    if webbrowser::open(&auth_url).is_err() {
        println!("Could not open a browser, visit this URL instead:\n{}", auth_url);
    }

    // Start local server to receive the callback
    let server = tiny_http::Server::http(CALLBACK_ADDR)
        .map_err(|e| other_error(&format!("Failed to listen on {}: {}", CALLBACK_ADDR, e)))?;
    println!("Waiting for authorization callback...");

    let request = server
        .recv()
        .map_err(|e| other_error(&format!("Failed to receive callback: {}", e)))?;
    let code = callback_code(request.url(), &state);

    let (message, result) = match code {
        Ok(code) => match tokens.exchange_code(&code).await {
            Ok(_) => ("Authorization successful! You can close this window.", Ok(())),
            Err(e) => ("Token exchange failed, see the terminal for details.", Err(e)),
        },
        Err(e) => ("Authorization failed, see the terminal for details.", Err(e)),
    };

    // Send response to browser
    if let Err(e) = request.respond(tiny_http::Response::from_string(message)) {
        eprintln!("Failed to answer the browser: {}", e);
    }

    result?;
    println!("Token saved to {}", tokens.token_path().display());
    Ok(())
}

fn token_manager(config: &Config, account: &str) -> CalendarResult<TokenManager> {
    let entry = config
        .account(account)
        .ok_or_else(|| config_error(&format!("No account named {}", account)))?;

    match &entry.provider {
        ProviderConfig::Google(google) => Ok(TokenManager::new(
            &entry.name,
            &google.client_id,
            &google.client_secret,
            &config.token_dir,
        )),
        other => Err(config_error(&format!(
            "Account {} is a {} account, not google",
            account,
            other.kind()
        ))),
    }
}

/// Pull the authorization code out of the callback path, checking `state`
fn callback_code(path: &str, state: &str) -> CalendarResult<String> {
    let url = Url::parse(&format!("http://localhost{}", path))
        .map_err(|e| other_error(&format!("Invalid callback URL: {}", e)))?;

    let mut code = None;
    let mut returned_state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => returned_state = Some(value.into_owned()),
            "error" => return Err(auth_error(&format!("Authorization denied: {}", value))),
            _ => {}
        }
    }

    if returned_state.as_deref() != Some(state) {
        return Err(auth_error("Callback state does not match, ignoring it"));
    }
    code.ok_or_else(|| other_error("No authorization code found in callback"))
}
