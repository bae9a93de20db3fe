//! Configuração do vestir carregada a partir de `vestir.toml`.
//!
//! A struct [`VestirConfig`] agrupa as seções `[provider]`, `[scoring]`,
//! `[background]`, `[gate]`, `[polling]`, `[images]` e `[tryon]`.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! Variáveis de ambiente `VESTIR_*` têm precedência sobre o arquivo.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::VestirError;

const CONFIG_FILE: &str = "vestir.toml";

/// Configuração de nível superior carregada de `vestir.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VestirConfig {
    pub provider: ProviderConfig,
    pub scoring: ScoringConfig,
    pub background: BackgroundConfig,
    pub gate: GateConfig,
    pub polling: PollingConfig,
    pub images: ImageConfig,
    pub tryon: TryOnConfig,
}

/// Provedor de inferência (`POST /run`, `GET /status/{id}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    /// Nome do modelo enviado no campo `model` do corpo.
    pub model: String,
    /// Formato de saída pedido ao provedor (`png` ou `jpeg`).
    pub output_format: String,
    /// Token literal usado no MIME de data URLs JPEG. Alguns provedores
    /// só aceitam `jpg`.
    pub jpeg_token: String,
    /// Sobrescreve o modo derivado da complexidade da peça.
    pub mode_override: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.fashn.ai/v1".to_string(),
            api_key: String::new(),
            model: "tryon-v1.6".to_string(),
            output_format: "png".to_string(),
            jpeg_token: "jpeg".to_string(),
            mode_override: None,
            request_timeout_ms: 30_000,
        }
    }
}

/// Serviço secundário de pontuação de qualidade.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub enabled: bool,
    pub url: String,
    pub api_key: String,
    /// Pontuação atribuída a um candidato cuja avaliação falhou.
    pub neutral_score: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            api_key: String::new(),
            neutral_score: 50.0,
        }
    }
}

/// Remoção de fundo das imagens de peça.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    pub enabled: bool,
    pub url: String,
    pub api_key: String,
    /// Pontuação mínima de transparência (0-100) para aceitar o resultado.
    pub min_score: u8,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            api_key: String::new(),
            min_score: 40,
        }
    }
}

/// Controle de admissão: backoff e circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Unidade base do backoff exponencial entre requisições após falhas.
    pub min_request_interval_ms: u64,
    pub max_backoff_ms: u64,
    /// Jitter máximo somado ao backoff.
    pub jitter_ms: u64,
    /// Falhas consecutivas antes de abrir o circuito.
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_base_ms: u64,
    pub max_circuit_breaker_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_request_interval_ms: 2_000,
            max_backoff_ms: 30_000,
            jitter_ms: 1_000,
            circuit_breaker_threshold: 3,
            circuit_breaker_base_ms: 5_000,
            max_circuit_breaker_ms: 300_000,
        }
    }
}

/// Intervalos do polling de status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub poll_interval_ms: u64,
    pub max_poll_budget_ms: u64,
    /// Teto do backoff após falhas de transporte durante o polling.
    pub max_poll_backoff_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            max_poll_budget_ms: 90_000,
            max_poll_backoff_ms: 10_000,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.max_poll_budget_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_poll_backoff_ms)
    }
}

/// Limites de dimensão e tamanho das imagens enviadas ao provedor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub avatar_max_bytes: usize,
    pub garment_max_bytes: usize,
    /// Caixa máxima do avatar (largura, altura); mantém a proporção.
    pub avatar_max_width: u32,
    pub avatar_max_height: u32,
    /// Maior lado permitido para a peça.
    pub garment_max_edge: u32,
    /// Escada de qualidade JPEG, em ordem decrescente.
    pub quality_ladder: Vec<u8>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            avatar_max_bytes: 3 * 1024 * 1024,
            garment_max_bytes: 8 * 1024 * 1024,
            avatar_max_width: 864,
            avatar_max_height: 1296,
            garment_max_edge: 2048,
            quality_ladder: vec![95, 90, 85, 80, 75, 70, 65, 60],
        }
    }
}

/// Parâmetros da operação de try-on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TryOnConfig {
    /// Amostras pedidas para peças complexas.
    pub max_samples: u32,
    /// Tentativas de submissão em falhas transitórias.
    pub max_submit_attempts: u32,
}

impl Default for TryOnConfig {
    fn default() -> Self {
        Self {
            max_samples: 2,
            max_submit_attempts: 2,
        }
    }
}

impl VestirConfig {
    /// Carrega a configuração de `vestir.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self, VestirError> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Carrega a configuração de um caminho explícito.
    pub fn load_from(path: &Path) -> Result<Self, VestirError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<VestirConfig>(&contents)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    // Variáveis de ambiente têm precedência sobre o arquivo de configuração.
    fn apply_env(&mut self) {
        if let Some(key) = non_empty_env("VESTIR_API_KEY") {
            self.provider.api_key = key;
        }
        if let Some(url) = non_empty_env("VESTIR_PROVIDER_URL") {
            self.provider.base_url = url;
        }
        if let Some(key) = non_empty_env("VESTIR_SCORING_API_KEY") {
            self.scoring.api_key = key;
        }
        if let Some(key) = non_empty_env("VESTIR_BACKGROUND_API_KEY") {
            self.background.api_key = key;
        }
    }

    /// Cópia com as chaves de API mascaradas, para exibição.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for key in [
            &mut copy.provider.api_key,
            &mut copy.scoring.api_key,
            &mut copy.background.api_key,
        ] {
            if !key.is_empty() {
                *key = "****".to_string();
            }
        }
        copy
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
