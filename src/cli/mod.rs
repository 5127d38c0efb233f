pub mod commands;
pub mod output;

pub use commands::{
    BuildArgs, CliArgs, Commands, GenerateArgs, IgnoreFileArgs, LaunchModeArg, RecipeArgs,
    RunCommandArgs, SmokeTestArgs, ValidateArgs,
};
pub use output::{OutputFormat, OutputFormatter, ValidationSummary};
