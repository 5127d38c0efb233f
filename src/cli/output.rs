//! Output formatting for the CLI
//!
//! Image definitions render as a Dockerfile, JSON, YAML or a human-readable
//! summary. Reports (validation, smoke tests, recipes) use the other
//! formats; asking for a Dockerfile rendering of a report is an error.
//!
//! # Example
//!
//! ```
//! use reconpack::cli::output::{OutputFormat, OutputFormatter};
//! use reconpack::{PackagingRecipe, PipelineOrchestrator, SourceTree};
//! use reconpack::manifest::ManifestVariant;
//!
//! let recipe = PackagingRecipe::default();
//! let image = PipelineOrchestrator::new(None)
//!     .execute(&recipe, &ManifestVariant::Production, &SourceTree::opaque())
//!     .unwrap();
//! let output = OutputFormatter::new(OutputFormat::Dockerfile)
//!     .format_image(&image)
//!     .unwrap();
//! assert!(output.contains("ARG REQUIREMENTS=requirements.txt"));
//! ```

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::image::ImageDefinition;
use crate::output::PackagingRecipe;
use crate::pipeline::ContextReport;
use crate::validation::{RuleOutcome, SmokeTest};

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Dockerfile text (image definitions only)
    Dockerfile,
    Json,
    Yaml,
    Human,
}

/// Everything `validate` found, in one serializable value
#[derive(Debug, Clone, Serialize)]
pub struct ValidationSummary {
    pub requirements: String,
    pub rules: Vec<RuleOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextReport>,
    /// Context check that failed outright
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_error: Option<String>,
}

impl ValidationSummary {
    pub fn passed(&self) -> bool {
        self.rules.iter().all(|r| r.passed) && self.context_error.is_none()
    }

    pub fn failures(&self) -> usize {
        self.rules.iter().filter(|r| !r.passed).count() + usize::from(self.context_error.is_some())
    }
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_image(&self, image: &ImageDefinition) -> Result<String> {
        match self.format {
            OutputFormat::Dockerfile => Ok(image.to_dockerfile()),
            OutputFormat::Json => serde_json::to_string_pretty(image)
                .context("Failed to serialize image definition to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(image).context("Failed to serialize image definition to YAML")
            }
            OutputFormat::Human => Ok(image.to_string()),
        }
    }

    pub fn format_recipe(&self, recipe: &PackagingRecipe) -> Result<String> {
        match self.format {
            OutputFormat::Dockerfile => bail!("Dockerfile output applies to image definitions only"),
            OutputFormat::Json => {
                serde_json::to_string_pretty(recipe).context("Failed to serialize recipe to JSON")
            }
            OutputFormat::Yaml => recipe.to_yaml(),
            OutputFormat::Human => Ok(recipe.to_string()),
        }
    }

    pub fn format_validation(&self, summary: &ValidationSummary) -> Result<String> {
        match self.format {
            OutputFormat::Dockerfile => bail!("Dockerfile output applies to image definitions only"),
            OutputFormat::Json => serde_json::to_string_pretty(summary)
                .context("Failed to serialize validation report to JSON"),
            OutputFormat::Yaml => serde_yaml::to_string(summary)
                .context("Failed to serialize validation report to YAML"),
            OutputFormat::Human => Ok(self.format_validation_human(summary)),
        }
    }

    pub fn format_smoke_test(&self, smoke: &SmokeTest) -> Result<String> {
        match self.format {
            OutputFormat::Dockerfile => bail!("Dockerfile output applies to image definitions only"),
            OutputFormat::Json => {
                serde_json::to_string_pretty(smoke).context("Failed to serialize smoke test to JSON")
            }
            OutputFormat::Yaml => {
                serde_yaml::to_string(smoke).context("Failed to serialize smoke test to YAML")
            }
            OutputFormat::Human => Ok(smoke.to_script()),
        }
    }

    fn format_validation_human(&self, summary: &ValidationSummary) -> String {
        let mut output = String::new();

        if summary.passed() {
            output.push_str("\u{2713} Validation Passed\n");
        } else {
            output.push_str(&format!(
                "\u{2717} Validation Failed ({} failure{})\n",
                summary.failures(),
                if summary.failures() == 1 { "" } else { "s" }
            ));
        }
        output.push_str(RULE);
        output.push_str("\n\n");
        output.push_str(&format!("Requirements: {}\n\n", summary.requirements));

        output.push_str("Rules:\n");
        for (i, outcome) in summary.rules.iter().enumerate() {
            let connector = if i + 1 == summary.rules.len() {
                "\u{2514}"
            } else {
                "\u{251C}"
            };
            let mark = if outcome.passed { "\u{2713}" } else { "\u{2717}" };
            output.push_str(&format!("{}\u{2500} {} {}\n", connector, mark, outcome.rule));
            if let Some(ref message) = outcome.message {
                output.push_str(&format!("     {}\n", message));
            }
        }

        if let Some(ref error) = summary.context_error {
            output.push_str(&format!("\nBuild Context:\n\u{2717} {}\n", error));
        }

        if let Some(ref report) = summary.context {
            output.push_str(&format!("\nBuild Context: {}\n", report.root.display()));
            output.push_str(&format!("\u{251C}\u{2500} Manifest:   {}\n", report.manifest.display()));
            let includes: Vec<String> = report
                .manifests
                .iter()
                .skip(1)
                .map(|m| m.path.display().to_string())
                .collect();
            if !includes.is_empty() {
                output.push_str(&format!("\u{251C}\u{2500} Includes:   {}\n", includes.join(", ")));
            }
            output.push_str(&format!(
                "\u{251C}\u{2500} Packages:   {}\n",
                report.analysis.distributions.len()
            ));
            if report.analysis.native_libraries.is_empty() {
                output.push_str("\u{2514}\u{2500} Native:     (none)\n");
            } else {
                output.push_str(&format!(
                    "\u{2514}\u{2500} Native:     {}\n",
                    report.analysis.native_libraries.join(", ")
                ));
            }

            if !report.warnings.is_empty() {
                output.push_str("\n\u{26A0} Warnings:\n");
                for warning in &report.warnings {
                    output.push_str(&format!("  - [{}] {}\n", warning.check, warning.message));
                }
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestVariant;
    use crate::pipeline::{PipelineOrchestrator, SourceTree};
    use crate::validation::Validator;

    fn image(recipe: &PackagingRecipe) -> ImageDefinition {
        PipelineOrchestrator::new(None)
            .execute(recipe, &ManifestVariant::Production, &SourceTree::opaque())
            .unwrap()
    }

    fn summary(recipe: &PackagingRecipe) -> ValidationSummary {
        ValidationSummary {
            requirements: "production".to_string(),
            rules: Validator::new().report(recipe, &image(recipe)),
            context: None,
            context_error: None,
        }
    }

    #[test]
    fn test_dockerfile_format() {
        let recipe = PackagingRecipe::default();
        let output = OutputFormatter::new(OutputFormat::Dockerfile)
            .format_image(&image(&recipe))
            .unwrap();
        assert!(output.starts_with("FROM "));
        assert!(output.contains("USER spiderfoot"));
    }

    #[test]
    fn test_json_format() {
        let recipe = PackagingRecipe::default();
        let output = OutputFormatter::new(OutputFormat::Json)
            .format_image(&image(&recipe))
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert!(parsed["builder"].is_object());
        assert!(parsed["runtime"].is_object());
    }

    #[test]
    fn test_yaml_recipe_round_trips() {
        let recipe = PackagingRecipe::default();
        let output = OutputFormatter::new(OutputFormat::Yaml)
            .format_recipe(&recipe)
            .unwrap();
        assert_eq!(PackagingRecipe::from_yaml(&output).unwrap(), recipe);
    }

    #[test]
    fn test_dockerfile_format_rejected_for_reports() {
        let recipe = PackagingRecipe::default();
        let formatter = OutputFormatter::new(OutputFormat::Dockerfile);
        assert!(formatter.format_recipe(&recipe).is_err());
        assert!(formatter.format_validation(&summary(&recipe)).is_err());
    }

    #[test]
    fn test_validation_human_passed() {
        let recipe = PackagingRecipe::default();
        let output = OutputFormatter::new(OutputFormat::Human)
            .format_validation(&summary(&recipe))
            .unwrap();
        assert!(output.contains("Validation Passed"));
        assert!(output.contains("NonRootUser"));
    }

    #[test]
    fn test_validation_human_reports_context_error() {
        let recipe = PackagingRecipe::default();
        let mut summary = summary(&recipe);
        summary.context_error = Some("Log directory 'log' is not present".to_string());

        assert!(!summary.passed());
        assert_eq!(summary.failures(), 1);
        let output = OutputFormatter::new(OutputFormat::Human)
            .format_validation(&summary)
            .unwrap();
        assert!(output.contains("Validation Failed (1 failure)"));
        assert!(output.contains("Log directory"));
    }

    #[test]
    fn test_smoke_test_human_is_script() {
        let recipe = PackagingRecipe::default();
        let smoke = SmokeTest::for_recipe(&recipe, "spiderfoot:latest");
        let output = OutputFormatter::new(OutputFormat::Human)
            .format_smoke_test(&smoke)
            .unwrap();
        assert_eq!(output, smoke.to_script());
    }
}
