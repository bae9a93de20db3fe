//! Tipos de dados para requisições e respostas do provedor de try-on.
//!
//! Todas as structs derivam `Serialize` e `Deserialize` para conversão JSON
//! conforme o formato esperado pelos endpoints `POST /run` e
//! `GET /status/{id}`.

use serde::{Deserialize, Serialize};

/// Corpo da requisição para o endpoint `POST /run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    /// Identificador do modelo de inferência (ex.: "tryon-v1.6").
    pub model: String,
    pub inputs: RunInputs,
}

/// Parâmetros de entrada do job de try-on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInputs {
    /// Imagem do avatar: URL remota ou data URL base64.
    pub model_image: String,
    /// Imagem da peça: URL remota ou data URL base64.
    pub garment_image: String,
    /// Categoria no vocabulário do provedor ("tops", "bottoms", "one-pieces", "auto").
    pub category: String,
    /// Quando `true`, a roupa existente não é segmentada/removida.
    pub segmentation_free: bool,
    /// "performance", "balanced" ou "quality".
    pub mode: String,
    pub seed: u32,
    pub num_samples: u32,
    pub output_format: String,
}

/// Resposta do `POST /run`: ou a saída imediata, ou um job assíncrono.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// URLs finais quando o provedor responde de forma síncrona.
    #[serde(default)]
    pub output: Option<Vec<String>>,
    #[serde(default)]
    pub error: Option<ProviderFailure>,
}

/// Resposta do `GET /status/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub output: Option<Vec<String>>,
    #[serde(default)]
    pub error: Option<ProviderFailure>,
}

/// Motivo de falha reportado pelo provedor. Aparece tanto como objeto
/// `{name, message}` quanto como string simples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderFailure {
    Detailed {
        name: String,
        #[serde(default)]
        message: String,
    },
    Message(String),
}

impl ProviderFailure {
    /// Texto combinado de nome e mensagem, usado na normalização.
    pub fn describe(&self) -> String {
        match self {
            ProviderFailure::Detailed { name, message } if message.is_empty() => name.clone(),
            ProviderFailure::Detailed { name, message } => format!("{name}: {message}"),
            ProviderFailure::Message(msg) => msg.clone(),
        }
    }
}
