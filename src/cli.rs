//! Interface de linha de comando do vestir baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (try-on, classify,
//! config) e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// vestir: orquestrador de provas virtuais de roupa.
#[derive(Debug, Parser)]
#[command(name = "vestir", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: `vestir.toml`).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Gera a imagem do avatar vestindo a peça.
    TryOn {
        /// Imagem do avatar: arquivo local, URL http(s) ou data URL.
        #[arg(long)]
        avatar: String,

        /// Imagem da peça: arquivo local, URL http(s) ou data URL.
        #[arg(long)]
        garment: String,

        /// Descrição livre da peça, usada na classificação.
        #[arg(long)]
        description: Option<String>,

        /// Orçamento de polling em milissegundos.
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Número de amostras pedidas ao provedor.
        #[arg(long)]
        samples: Option<u32>,

        /// Seed fixa para resultados reproduzíveis.
        #[arg(long)]
        seed: Option<u32>,

        /// Imprime o resultado completo em JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Classifica uma peça a partir de uma descrição ou URL.
    Classify {
        /// Descrição ou URL da peça.
        hint: String,
    },

    /// Mostra a configuração efetiva, com chaves mascaradas.
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_try_on_subcommand() {
        let cli = Cli::parse_from([
            "vestir",
            "try-on",
            "--avatar",
            "me.jpg",
            "--garment",
            "https://shop.example.com/dress.png",
            "--timeout-ms",
            "5000",
            "--json",
        ]);
        match cli.command {
            Command::TryOn {
                avatar,
                garment,
                description,
                timeout_ms,
                json,
                ..
            } => {
                assert_eq!(avatar, "me.jpg");
                assert_eq!(garment, "https://shop.example.com/dress.png");
                assert!(description.is_none());
                assert_eq!(timeout_ms, Some(5000));
                assert!(json);
            }
            _ => panic!("expected TryOn command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from(["vestir", "--config", "alt.toml", "--verbose", "config"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
        assert!(matches!(cli.command, Command::Config));
    }

    #[test]
    fn cli_parses_classify_subcommand() {
        let cli = Cli::parse_from(["vestir", "classify", "oversized denim jacket"]);
        match cli.command {
            Command::Classify { hint } => assert_eq!(hint, "oversized denim jacket"),
            _ => panic!("expected Classify command"),
        }
    }

    #[test]
    fn try_on_requires_both_images() {
        assert!(Cli::try_parse_from(["vestir", "try-on", "--avatar", "me.jpg"]).is_err());
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
