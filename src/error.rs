//! Error types for the warranty-watch library.
//!
//! Every failure the warranty core can surface maps to one [`WarrantyError`]
//! variant. `Display` is meant for logs; [`WarrantyError::user_message`] is the
//! localized text shown to the person using the app.

use thiserror::Error;

/// Errors that can occur in the warranty lifecycle and sync core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WarrantyError {
    /// Required input missing or malformed; rejected before any remote call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Reading the local image took longer than the configured bound
    #[error("Image fetch timed out after {0} seconds")]
    UploadTimeout(u64),

    /// Any other failure in the image pipeline
    #[error("Image upload failed: {0}")]
    Upload(String),

    /// The remote data store rejected or could not run a query/insert/update
    #[error("Remote store error: {0}")]
    Store(String),

    /// The local notification service could not schedule a reminder
    #[error("Notification scheduling failed: {0}")]
    Notification(String),

    /// The realtime channel degraded; data may be stale
    #[error("Realtime transport error: {0}")]
    RealtimeTransport(String),

    /// A date-like value could not be parsed or overflowed the calendar
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// An operation that needs an owner ran while signed out
    #[error("No authenticated owner")]
    NotAuthenticated,

    /// Invalid or missing configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Convenience type alias for Result with WarrantyError
pub type Result<T> = std::result::Result<T, WarrantyError>;

impl WarrantyError {
    /// Localized, human-readable message for display.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(_) => "Preencha todos os campos obrigatórios.".to_string(),
            Self::UploadTimeout(_) => {
                "Tempo esgotado ao carregar a imagem da garantia. Tente novamente.".to_string()
            }
            Self::Upload(_) => "Falha ao enviar imagem da garantia. Tente novamente.".to_string(),
            Self::Store(_) => "Erro ao salvar ou carregar garantias. Tente novamente.".to_string(),
            Self::Notification(_) => {
                "Não foi possível agendar o lembrete de vencimento.".to_string()
            }
            Self::RealtimeTransport(_) => {
                "Erro na conexão com atualizações em tempo real.".to_string()
            }
            Self::InvalidDate(value) => format!("Data inválida: {value}"),
            Self::NotAuthenticated => "Usuário não autenticado.".to_string(),
            Self::Config(_) => "Configuração do aplicativo ausente ou inválida.".to_string(),
        }
    }

    /// Short machine-friendly name, used as a metrics label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::UploadTimeout(_) => "upload_timeout",
            Self::Upload(_) => "upload",
            Self::Store(_) => "store",
            Self::Notification(_) => "notification",
            Self::RealtimeTransport(_) => "realtime",
            Self::InvalidDate(_) => "invalid_date",
            Self::NotAuthenticated => "not_authenticated",
            Self::Config(_) => "config",
        }
    }

    /// Whether a failure of this kind aborts the create workflow.
    #[must_use]
    pub const fn aborts_creation(&self) -> bool {
        !matches!(self, Self::Notification(_) | Self::RealtimeTransport(_))
    }
}

impl From<reqwest::Error> for WarrantyError {
    fn from(err: reqwest::Error) -> Self {
        WarrantyError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for WarrantyError {
    fn from(err: serde_json::Error) -> Self {
        WarrantyError::Store(format!("unexpected payload: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_differs_from_generic_upload() {
        let timeout = WarrantyError::UploadTimeout(10);
        let generic = WarrantyError::Upload("boom".to_string());
        assert_ne!(timeout.user_message(), generic.user_message());
        assert!(timeout.user_message().contains("Tempo esgotado"));
    }

    #[test]
    fn test_store_detail_stays_out_of_user_message() {
        let err = WarrantyError::Store("503: <html>Service Unavailable</html>".to_string());
        assert!(err.to_string().contains("503"));
        assert!(!err.user_message().contains("503"));
        assert!(err.user_message().starts_with("Erro ao salvar"));
    }

    #[test]
    fn test_notification_errors_do_not_abort() {
        assert!(!WarrantyError::Notification("x".into()).aborts_creation());
        assert!(WarrantyError::Upload("x".into()).aborts_creation());
        assert!(WarrantyError::Store("x".into()).aborts_creation());
    }
}
