/// Core error type.
///
/// Adapter crates map their specific errors into this type so handlers can
/// surface failures consistently as a chat reply.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or malformed user input, detected before any node call.
    #[error("{0}")]
    Validation(String),

    /// Requester is not the paired owner.
    #[error("unauthorized")]
    Unauthorized,

    /// The bot has not been paired with an owner yet.
    #[error("bot is not connected; send /connect with the connect code")]
    MissingOwner,

    /// Referenced invoice/trade/node no longer exists.
    #[error("{0}")]
    NotFound(String),

    /// External RPC or HTTP failure.
    #[error("{message}")]
    Upstream { code: u16, message: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn upstream(code: u16, msg: impl Into<String>) -> Self {
        Self::Upstream {
            code,
            message: msg.into(),
        }
    }

    /// HTTP-style status code used when reporting the failure.
    pub fn code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Unauthorized => 401,
            Error::MissingOwner => 403,
            Error::NotFound(_) => 404,
            Error::Upstream { .. } => 503,
            Error::Config(_) | Error::Io(_) | Error::Json(_) | Error::External(_) => 500,
        }
    }

    /// Text shown to the chat user.
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthorized => "⛔️ Unauthorized. This bot is connected to another user.".to_string(),
            Error::MissingOwner => {
                "🔌 Bot is not connected yet. Send /connect followed by the connect code.".to_string()
            }
            Error::Upstream { message, .. } => format!("⚠️ Node error: {message}"),
            other => format!("⚠️ {other}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
