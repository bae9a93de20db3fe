//! Tipos de erro para o cliente do provedor de try-on.
//!
//! Define [`ProviderError`] com variantes para rate limiting, erros de
//! validação, falhas transitórias e erros de rede, e [`ErrorClass`], a
//! classificação usada pelo gate e pelo polling para decidir o que fazer.

use thiserror::Error;

/// Erros que podem ocorrer ao interagir com o provedor de inferência.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// O servidor retornou HTTP 429 (rate limit).
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Erro 4xx: imagem malformada, formato ou categoria não suportados.
    #[error("validation error (status {status}): {message}")]
    Validation { status: u16, message: String },

    /// Erro 5xx do provedor.
    #[error("provider error (status {status}): {message}")]
    Transient { status: u16, message: String },

    /// Falha de rede subjacente (DNS, conexão recusada, timeout).
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Corpo de resposta inesperado.
    #[error("failed to parse provider response: {0}")]
    ParseError(String),
}

/// Classe de falha, que determina retentativas e efeito no circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// 5xx ou rede. Retentado internamente; não conta para o breaker.
    Transient,
    /// 429. Conta para o breaker.
    RateLimited,
    /// 4xx. Não retentável; problema nos dados, não de capacidade.
    Validation,
}

impl ProviderError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::RateLimited { .. } => ErrorClass::RateLimited,
            ProviderError::Validation { .. } => ErrorClass::Validation,
            ProviderError::Transient { .. }
            | ProviderError::NetworkError(_)
            | ProviderError::ParseError(_) => ErrorClass::Transient,
        }
    }

    /// Mapeia um status HTTP de erro para a variante correspondente.
    pub fn from_status(status: u16, message: String, retry_after_ms: Option<u64>) -> Self {
        match status {
            429 => ProviderError::RateLimited {
                retry_after_ms: retry_after_ms.unwrap_or(1000),
            },
            400..=499 => ProviderError::Validation { status, message },
            _ => ProviderError::Transient { status, message },
        }
    }
}
