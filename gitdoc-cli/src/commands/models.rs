//! Models command - list AI models and pick the one used for messages

use clap::Args;
use gitdoc_core::ai::{self, ModelInfo};

use super::{interaction, Workspace};

/// List AI models and choose the one to use
#[derive(Args, Debug)]
pub struct ModelsArgs {
    /// Select this model id without prompting
    #[arg(long)]
    select: Option<String>,
}

impl ModelsArgs {
    pub async fn execute(&self, workspace: &Workspace) -> anyhow::Result<()> {
        let config = workspace.settings.snapshot()?;
        let provider = ai::provider_from_config(&config.ai);

        if let Some(id) = &self.select {
            workspace.settings.set_ai_model(id)?;
            println!("AI model set to {}", id);
            return Ok(());
        }

        let models = provider.list_models().await?;
        if models.is_empty() {
            println!("No models available from {}", provider.name());
            return Ok(());
        }

        println!("Models from {}:", provider.name());
        for (i, model) in models.iter().enumerate() {
            let marker = if is_current(model, &config.ai.model) { "*" } else { " " };
            println!("{} {:>2}. {} ({})", marker, i + 1, model.name, model.id);
        }

        let answer = interaction::prompt("Select a model number (blank to keep current): ", None)
            .unwrap_or_default();
        if answer.is_empty() {
            return Ok(());
        }

        match pick(&models, &answer) {
            Some(model) => {
                workspace.settings.set_ai_model(&model.id)?;
                println!("AI model set to {}", model.id);
            }
            None => anyhow::bail!("Invalid selection: {}", answer),
        }
        Ok(())
    }
}

fn is_current(model: &ModelInfo, configured: &str) -> bool {
    model.id == configured || model.family == configured
}

fn pick<'a>(models: &'a [ModelInfo], answer: &str) -> Option<&'a ModelInfo> {
    let index: usize = answer.trim().parse().ok()?;
    models.get(index.checked_sub(1)?)
}
