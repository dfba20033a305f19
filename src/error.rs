use jsonwebtoken::errors::Error as JwtError;
use rocket::{
    http::Status,
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to load {source_name}: {reason}")]
    ConfigLoad { source_name: String, reason: String },
    #[error("Empty access code")]
    EmptyToken,
    #[error("Unknown access code")]
    InvalidToken,
    #[error("Access code already used")]
    TokenAlreadyUsed,
    #[error("Access code not found: {0}")]
    TokenNotFound(String),
    #[error("No candidates selected")]
    EmptySelection,
    #[error("Selected {count} candidates, the maximum is {max}")]
    SelectionLimitExceeded { count: usize, max: usize },
    #[error("No authenticated voting session")]
    NotAuthenticated,
    #[error("Voting session already authenticated")]
    AlreadyAuthenticated,
    #[error("Voting session already submitted")]
    SessionClosed,
    #[error("List API request failed ({status}): {context}")]
    RemoteApi { status: Status, context: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Jwt(#[from] JwtError),
}

impl Error {
    /// Shorthand for a [`Error::ConfigLoad`] naming the failing source.
    pub fn config_load(source_name: impl ToString, reason: impl ToString) -> Self {
        Self::ConfigLoad {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// The HTTP status this error is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::EmptyToken => Status::BadRequest,
            Self::InvalidToken | Self::NotAuthenticated => Status::Unauthorized,
            Self::TokenAlreadyUsed => Status::Forbidden,
            Self::TokenNotFound(_) => Status::NotFound,
            Self::EmptySelection | Self::SelectionLimitExceeded { .. } => {
                Status::UnprocessableEntity
            }
            Self::AlreadyAuthenticated | Self::SessionClosed => Status::Conflict,
            Self::RemoteApi { .. } | Self::Http(_) => Status::BadGateway,
            Self::ConfigLoad { .. } | Self::Io(_) | Self::Csv(_) | Self::Jwt(_) => {
                Status::InternalServerError
            }
        }
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigLoad { .. } => "config_load",
            Self::EmptyToken => "empty_token",
            Self::InvalidToken => "invalid_token",
            Self::TokenAlreadyUsed => "token_already_used",
            Self::TokenNotFound(_) => "token_not_found",
            Self::EmptySelection => "empty_selection",
            Self::SelectionLimitExceeded { .. } => "selection_limit_exceeded",
            Self::NotAuthenticated => "not_authenticated",
            Self::AlreadyAuthenticated => "already_authenticated",
            Self::SessionClosed => "session_closed",
            Self::RemoteApi { .. } | Self::Http(_) => "remote_api",
            Self::Io(_) | Self::Csv(_) | Self::Jwt(_) => "internal",
        }
    }

    /// The message shown to the voter on screen.
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyToken => "Debes ingresar tu código de acceso.".to_string(),
            Self::InvalidToken => "Código de acceso inválido.".to_string(),
            Self::TokenAlreadyUsed => "Este código de acceso ya fue usado.".to_string(),
            Self::EmptySelection => "Debes seleccionar al menos un candidato.".to_string(),
            Self::SelectionLimitExceeded { count, max } => format!(
                "Seleccionaste {count}. El máximo es {max}. Desmarca algunos antes de continuar."
            ),
            Self::NotAuthenticated => "Debes ingresar tu código de acceso.".to_string(),
            Self::AlreadyAuthenticated => "Ya ingresaste tu código de acceso.".to_string(),
            Self::SessionClosed => "¡Gracias por votar! Tu respuesta ya fue registrada.".to_string(),
            _ => "No se pudo completar la operación. Inténtalo nuevamente.".to_string(),
        }
    }
}

/// JSON body attached to every error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        if status.code >= 500 {
            error!("{self}");
        } else {
            warn!("{self}");
        }
        let body = ErrorBody {
            error: self.kind(),
            message: self.user_message(),
        };
        (status, Json(body)).respond_to(req)
    }
}
