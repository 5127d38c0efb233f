use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Two-stage container packaging for SpiderFoot
#[derive(Parser, Debug)]
#[command(
    name = "reconpack",
    about = "Two-stage container packaging for the SpiderFoot reconnaissance tool",
    version,
    author,
    long_about = "reconpack assembles a two-stage image definition for SpiderFoot: a builder \
                  stage that compiles the Python dependencies into an isolated environment, \
                  and a runtime stage that carries only that environment, the runtime \
                  libraries and the application, running as an unprivileged user."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(
        short = 'v',
        long,
        global = true,
        action = ArgAction::Count,
        help = "Increase verbosity (-v debug, -vv trace)"
    )]
    pub verbose: u8,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,

    #[arg(
        long,
        global = true,
        value_name = "FILE",
        help = "YAML packaging recipe (defaults to RECONPACK_RECIPE or the built-in recipe)"
    )]
    pub recipe: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Render the two-stage image definition",
        long_about = "Assembles the builder and runtime stages and renders them.\n\n\
                      Examples:\n  \
                      reconpack generate > Dockerfile\n  \
                      reconpack generate --requirements test\n  \
                      reconpack generate --format json -o image.json"
    )]
    Generate(GenerateArgs),

    #[command(
        about = "Validate the image definition and a build context",
        long_about = "Runs every validation rule against the assembled definition. With \
                      --context, also checks that the selected manifest exists, parses and \
                      declares dependencies, and that the source tree holds the entrypoint \
                      script and the log directory.\n\n\
                      Examples:\n  \
                      reconpack validate\n  \
                      reconpack validate --context ./spiderfoot --requirements test"
    )]
    Validate(ValidateArgs),

    #[command(about = "Render a .dockerignore for the build context")]
    IgnoreFile(IgnoreFileArgs),

    #[command(
        about = "Print post-build smoke test commands",
        long_about = "Prints the commands that import every compiled extension module in the \
                      finished image, check the runtime user and confirm the runtime directories are writable."
    )]
    SmokeTest(SmokeTestArgs),

    #[command(
        about = "Print a docker run command for a launch mode",
        long_about = "Examples:\n  \
                      reconpack run-command\n  \
                      reconpack run-command --mode cli --server-url http://sf:5001\n  \
                      reconpack run-command --mode batch --target example.com --modules sfp_dnsresolve"
    )]
    RunCommand(RunCommandArgs),

    #[command(about = "Show the effective packaging recipe")]
    Recipe(RecipeArgs),

    #[command(
        about = "Build the image from a context directory",
        long_about = "Writes Dockerfile.reconpack into the context and builds it with the \
                      configured build tool (RECONPACK_BUILD_TOOL: 'daemon' or a docker-compatible \
                      CLI). REQUIREMENTS is the only build argument.\n\n\
                      Examples:\n  \
                      reconpack build --context ./spiderfoot\n  \
                      reconpack build --context ./spiderfoot --test --tag spiderfoot:test"
    )]
    Build(BuildArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct GenerateArgs {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "dockerfile",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[arg(
        short = 'r',
        long,
        value_name = "VARIANT",
        default_value = "production",
        help = "Requirements manifest: 'production', 'test', or a path in the context"
    )]
    pub requirements: String,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct ValidateArgs {
    #[arg(short = 'c', long, value_name = "DIR", help = "Build context to check")]
    pub context: Option<PathBuf>,

    #[arg(
        short = 'r',
        long,
        value_name = "VARIANT",
        default_value = "production",
        help = "Requirements manifest: 'production', 'test', or a path in the context"
    )]
    pub requirements: String,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct IgnoreFileArgs {
    #[arg(
        long = "exclude",
        value_name = "PATTERN",
        help = "Additional pattern to exclude (repeatable)"
    )]
    pub extra: Vec<String>,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct SmokeTestArgs {
    #[arg(short = 'i', long, value_name = "TAG", help = "Image to test")]
    pub image: Option<String>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchModeArg {
    Server,
    Cli,
    Batch,
}

#[derive(Parser, Debug, Clone)]
pub struct RunCommandArgs {
    #[arg(
        short = 'm',
        long,
        value_enum,
        default_value = "server",
        help = "Launch mode"
    )]
    pub mode: LaunchModeArg,

    #[arg(short = 'i', long, value_name = "TAG", help = "Image to run")]
    pub image: Option<String>,

    #[arg(long, value_name = "TARGET", help = "Scan target (batch mode)")]
    pub target: Option<String>,

    #[arg(
        long,
        value_name = "MODULES",
        value_delimiter = ',',
        help = "Comma-separated module list (batch mode)"
    )]
    pub modules: Vec<String>,

    #[arg(long, value_name = "URL", help = "Server URL (cli mode)")]
    pub server_url: Option<String>,

    #[arg(long, value_name = "NAME", help = "Volume mounted on the data directory")]
    pub data_volume: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct RecipeArgs {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "yaml",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    #[arg(short = 'c', long, value_name = "DIR", help = "Build context")]
    pub context: PathBuf,

    #[arg(short = 't', long, value_name = "TAG", help = "Image tag")]
    pub tag: Option<String>,

    #[arg(long, conflicts_with = "requirements", help = "Build with the test manifest")]
    pub test: bool,

    #[arg(
        short = 'r',
        long,
        value_name = "VARIANT",
        help = "Requirements manifest: 'production', 'test', or a path in the context"
    )]
    pub requirements: Option<String>,

    #[arg(
        long,
        help = "Check the context and print the build command without writing or building anything"
    )]
    pub dry_run: bool,
}

impl BuildArgs {
    pub fn variant(&self) -> &str {
        match self.requirements {
            Some(ref value) => value,
            None if self.test => "test",
            None => "production",
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Dockerfile,
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Dockerfile => super::output::OutputFormat::Dockerfile,
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}
