//! Interface de terminal do vestir: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`TryOnProgress`] acompanha visualmente
//! uma prova virtual no terminal.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use vestir::TryOnResult;
use vestir::garment::GarmentProfile;

/// Indicador visual de progresso para uma prova virtual no terminal.
///
/// Exibe um spinner animado durante o processamento e mensagens
/// coloridas para sucesso (verde), fallback (amarelo) e detalhes (cinza).
pub struct TryOnProgress {
    pb: ProgressBar,
    green: Style,
    yellow: Style,
    dim: Style,
}

impl TryOnProgress {
    /// Inicia o spinner com uma descrição curta da peça.
    pub fn start(label: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Vestindo: {label}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            yellow: Style::new().yellow().bold(),
            dim: Style::new().dim(),
        }
    }

    /// Remove o spinner da tela.
    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }

    /// Resumo legível do resultado.
    ///
    /// Resultado real em verde com checkmark; fallback em amarelo, com o
    /// motivo e a espera sugerida quando houver.
    pub fn report(&self, result: &TryOnResult) {
        let d = &result.diagnostics;
        if result.fallback_used {
            println!(
                "  {} Fallback para o avatar original",
                self.yellow.apply_to("↺")
            );
            if let Some(error) = &d.error {
                println!("    {}", self.dim.apply_to(error));
            }
            if let Some(wait) = d.retry_after_ms {
                println!(
                    "    {}",
                    self.dim
                        .apply_to(format!("tente novamente em {}s", wait.div_ceil(1000)))
                );
            }
        } else {
            println!("  {} Prova concluída", self.green.apply_to("✓"));
        }
        println!("  {}", result.image_url);
        println!(
            "  {}",
            self.dim.apply_to(format!(
                "{} / {} / {} · {} tentativa(s) · {}ms · {}",
                d.category,
                d.fitting_type,
                d.complexity,
                d.attempts,
                d.processing_time_ms,
                d.request_id,
            ))
        );
        if let Some(score) = d.selected_score {
            println!("  {}", self.dim.apply_to(format!("score: {score:.1}")));
        }
    }
}

/// Imprime o perfil derivado de uma descrição de peça.
pub fn print_profile(hint: &str, profile: &GarmentProfile) {
    let label = Style::new().cyan().bold();
    println!("{}", label.apply_to(hint));
    println!("  category:          {}", profile.category);
    println!("  fitting_type:      {}", profile.fitting_type);
    println!("  complexity:        {}", profile.complexity);
    println!("  skip_segmentation: {}", profile.skip_segmentation);
}
