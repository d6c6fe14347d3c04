use std::fmt;

/// Where an account is in its credential flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unauthorized,
    /// The operator was handed a URL and the account waits for the code
    AwaitingCode { authorization_url: String },
    Authorized,
}

/// Something that happened to an account's credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// Usable credentials were found in storage
    CredentialsFound,
    /// Credentials are missing and the flow needs a code from the operator
    CodeRequested { authorization_url: String },
    /// A submitted code was exchanged and stored
    CodeAccepted,
    /// The provider refused the stored credentials
    CredentialsRejected,
}

impl AuthState {
    pub fn is_authorized(&self) -> bool {
        matches!(self, AuthState::Authorized)
    }

    /// Next state after `event`
    pub fn on(&self, event: AuthEvent) -> AuthState {
        match event {
            AuthEvent::CredentialsFound | AuthEvent::CodeAccepted => AuthState::Authorized,
            AuthEvent::CodeRequested { authorization_url } => {
                AuthState::AwaitingCode { authorization_url }
            }
            AuthEvent::CredentialsRejected => AuthState::Unauthorized,
        }
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthState::Unauthorized => write!(f, "unauthorized"),
            AuthState::AwaitingCode { .. } => write!(f, "awaiting code"),
            AuthState::Authorized => write!(f, "authorized"),
        }
    }
}
