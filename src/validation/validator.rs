use crate::image::ImageDefinition;
use crate::output::PackagingRecipe;
use crate::validation::rules::{
    DefaultLaunchRule, MatchingBaseImageRule, NoToolchainInRuntimeRule, NonRootUserRule,
    PathBindingRule, PinnedBaseImageRule, RuntimeLibraryMappingRule, RuntimeOwnershipRule,
    SingleBuildArgRule, ValidationRule,
};
use anyhow::Result;
use serde::Serialize;

/// Result of one rule, for reports that list every rule
#[derive(Debug, Clone, Serialize)]
pub struct RuleOutcome {
    pub rule: &'static str,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<Box<dyn ValidationRule>>) -> Self {
        Self { rules }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Stops at the first failing rule
    pub fn validate(&self, recipe: &PackagingRecipe, image: &ImageDefinition) -> Result<()> {
        for rule in &self.rules {
            if let Err(e) = rule.validate(recipe, image) {
                anyhow::bail!("[{}] {}", rule.name(), e);
            }
        }
        Ok(())
    }

    /// Runs every rule and reports each outcome
    pub fn report(&self, recipe: &PackagingRecipe, image: &ImageDefinition) -> Vec<RuleOutcome> {
        self.rules
            .iter()
            .map(|rule| match rule.validate(recipe, image) {
                Ok(()) => RuleOutcome {
                    rule: rule.name(),
                    passed: true,
                    message: None,
                },
                Err(e) => RuleOutcome {
                    rule: rule.name(),
                    passed: false,
                    message: Some(e.to_string()),
                },
            })
            .collect()
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            rules: vec![
                Box::new(PinnedBaseImageRule),
                Box::new(MatchingBaseImageRule),
                Box::new(RuntimeLibraryMappingRule),
                Box::new(NoToolchainInRuntimeRule),
                Box::new(NonRootUserRule),
                Box::new(RuntimeOwnershipRule),
                Box::new(PathBindingRule),
                Box::new(DefaultLaunchRule),
                Box::new(SingleBuildArgRule),
            ],
        }
    }
}
