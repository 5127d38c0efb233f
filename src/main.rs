use reconpack::cli::commands::{
    BuildArgs, CliArgs, Commands, GenerateArgs, IgnoreFileArgs, LaunchModeArg, RecipeArgs,
    RunCommandArgs, SmokeTestArgs, ValidateArgs,
};
use reconpack::cli::output::{OutputFormatter, ValidationSummary};
use reconpack::fs::RealFileSystem;
use reconpack::image::ignore;
use reconpack::manifest::{ManifestVariant, RequirementsRef};
use reconpack::pipeline::{assemble_build_env, assemble_runtime_image};
use reconpack::progress::{LoggingHandler, ProgressHandler};
use reconpack::util::logging::{self, parse_level};
use reconpack::validation::SmokeTest;
use reconpack::{
    BuildContext, BuildRequest, ImageBuilder, LaunchMode, PackagingError, PackagingRecipe,
    PipelineOrchestrator, ReconpackConfig, RunCommand, SourceTree, Validator, NAME, VERSION,
};

use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("{} v{} starting", NAME, VERSION);
    debug!("Arguments: {:?}", args);

    let recipe = args.recipe.clone();
    let exit_code = match &args.command {
        Commands::Generate(generate_args) => handle_generate(generate_args, recipe, args.quiet),
        Commands::Validate(validate_args) => handle_validate(validate_args, recipe),
        Commands::IgnoreFile(ignore_args) => handle_ignore_file(ignore_args, recipe),
        Commands::SmokeTest(smoke_args) => handle_smoke_test(smoke_args, recipe),
        Commands::RunCommand(run_args) => handle_run_command(run_args, recipe),
        Commands::Recipe(recipe_args) => handle_recipe(recipe_args, recipe),
        Commands::Build(build_args) => handle_build(build_args, recipe, args.quiet).await,
    };

    process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let mut config = logging::config_from_env();
    config.level = if let Some(level_str) = &args.log_level {
        parse_level(level_str)
    } else if args.verbose >= 2 {
        Level::TRACE
    } else if args.verbose == 1 {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        config.level
    };
    logging::init_logging(config);
}

fn load_settings(recipe: Option<PathBuf>) -> Option<(ReconpackConfig, PackagingRecipe)> {
    let config = ReconpackConfig::default().with_recipe_path(recipe);
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        eprintln!("\nPlease check your RECONPACK_* environment variables and command-line arguments.");
        return None;
    }
    let mut settings: Vec<_> = config.to_display_map().into_iter().collect();
    settings.sort();
    debug!("Configuration: {:?}", settings);

    match config.load_recipe() {
        Ok(recipe) => {
            debug!("Loaded recipe '{}'", recipe.metadata.name);
            Some((config, recipe))
        }
        Err(e) => {
            error!("{}", e);
            None
        }
    }
}

fn parse_variant(value: &str) -> Option<ManifestVariant> {
    match ManifestVariant::parse(value) {
        Ok(variant) => Some(variant),
        Err(e) => {
            error!("{}", e);
            None
        }
    }
}

fn progress_handler(quiet: bool) -> Option<Arc<dyn ProgressHandler>> {
    if quiet {
        None
    } else {
        Some(Arc::new(LoggingHandler))
    }
}

fn write_output(content: &str, output: Option<&Path>) -> i32 {
    match output {
        Some(path) => match fs::write(path, content) {
            Ok(()) => {
                info!("Output written to {}", path.display());
                0
            }
            Err(e) => {
                error!("Failed to write output file {}: {}", path.display(), e);
                1
            }
        },
        None => {
            print!("{}", content);
            if !content.ends_with('\n') {
                println!();
            }
            0
        }
    }
}

fn handle_generate(args: &GenerateArgs, recipe: Option<PathBuf>, quiet: bool) -> i32 {
    let Some((_, recipe)) = load_settings(recipe) else {
        return 1;
    };
    let Some(variant) = parse_variant(&args.requirements) else {
        return 1;
    };

    let orchestrator = PipelineOrchestrator::new(progress_handler(quiet));
    let image = match orchestrator.execute(&recipe, &variant, &SourceTree::opaque()) {
        Ok(image) => image,
        Err(e) => {
            error!("Failed to assemble image definition: {:#}", e);
            return 1;
        }
    };

    match OutputFormatter::new(args.format.into()).format_image(&image) {
        Ok(content) => write_output(&content, args.output.as_deref()),
        Err(e) => {
            error!("Failed to format output: {:#}", e);
            1
        }
    }
}

fn handle_validate(args: &ValidateArgs, recipe: Option<PathBuf>) -> i32 {
    let Some((_, recipe)) = load_settings(recipe) else {
        return 1;
    };
    let Some(variant) = parse_variant(&args.requirements) else {
        return 1;
    };

    let fs = RealFileSystem::new();
    let mut context = None;
    let mut context_error = None;
    if let Some(ref root) = args.context {
        info!("Inspecting build context {}", root.display());
        match BuildContext::new(&fs, root.clone()).inspect(&recipe, &variant) {
            Ok(report) => context = Some(report),
            Err(e) => {
                error!("Build context check failed: {:#}", e);
                context_error = Some(format!("{:#}", e));
            }
        }
    }

    let source = context
        .as_ref()
        .map(|report| report.source.clone())
        .unwrap_or_else(SourceTree::opaque);
    let image = RequirementsRef::resolve(&recipe.builder.requirements, &variant)
        .and_then(|requirements| assemble_build_env(&recipe, &requirements))
        .and_then(|env| assemble_runtime_image(&env, &source, &recipe));
    let image = match image {
        Ok(image) => image,
        Err(e) => {
            error!("Failed to assemble image definition: {}", e);
            return 1;
        }
    };

    let summary = ValidationSummary {
        requirements: variant.to_string(),
        rules: Validator::new().report(&recipe, &image),
        context,
        context_error,
    };
    for outcome in summary.rules.iter().filter(|o| !o.passed) {
        error!(
            "[{}] {}",
            outcome.rule,
            outcome.message.as_deref().unwrap_or("failed")
        );
    }

    match OutputFormatter::new(args.format.into()).format_validation(&summary) {
        Ok(content) => {
            write_output(&content, None);
        }
        Err(e) => {
            error!("Failed to format output: {:#}", e);
            return 1;
        }
    }

    if summary.passed() {
        0
    } else {
        1
    }
}

fn handle_ignore_file(args: &IgnoreFileArgs, recipe: Option<PathBuf>) -> i32 {
    let Some((_, recipe)) = load_settings(recipe) else {
        return 1;
    };

    let requirements = &recipe.builder.requirements;
    let mut keep = vec![
        requirements.production.as_str(),
        requirements.test.as_str(),
        recipe.launch.server_script.as_str(),
    ];
    let log_dir = reconpack::pipeline::runtime::relative_to_workdir(
        &recipe.runtime.log_dir.path,
        &recipe.runtime.workdir,
    )
    .map(|p| p.display().to_string());
    if let Some(ref log_dir) = log_dir {
        keep.push(log_dir.as_str());
    }

    write_output(&ignore::render(&keep, &args.extra), args.output.as_deref())
}

fn handle_smoke_test(args: &SmokeTestArgs, recipe: Option<PathBuf>) -> i32 {
    let Some((config, recipe)) = load_settings(recipe) else {
        return 1;
    };
    let image = args.image.clone().unwrap_or(config.image_tag);
    let smoke = SmokeTest::for_recipe(&recipe, &image);
    debug!("Smoke test covers {} modules", smoke.modules.len());

    match OutputFormatter::new(args.format.into()).format_smoke_test(&smoke) {
        Ok(content) => write_output(&content, None),
        Err(e) => {
            error!("Failed to format output: {:#}", e);
            1
        }
    }
}

fn handle_run_command(args: &RunCommandArgs, recipe: Option<PathBuf>) -> i32 {
    let Some((config, recipe)) = load_settings(recipe) else {
        return 1;
    };

    let mode = match args.mode {
        LaunchModeArg::Server => LaunchMode::Server,
        LaunchModeArg::Cli => LaunchMode::remote_cli(args.server_url.as_deref(), &recipe.launch),
        LaunchModeArg::Batch => {
            match LaunchMode::batch(args.target.as_deref().unwrap_or(""), &args.modules, None) {
                Ok(mode) => mode,
                Err(e) => {
                    error!("{}", e);
                    eprintln!("\nUse --target to name the scan target, e.g. --target example.com");
                    return 1;
                }
            }
        }
    };
    if args.server_url.is_some() && args.mode != LaunchModeArg::Cli {
        warn!("--server-url only applies to cli mode");
    }

    let image = args.image.clone().unwrap_or(config.image_tag);
    let mut command = RunCommand::new(&recipe, image, mode);
    if let Some(ref volume) = args.data_volume {
        command = command.with_data_volume(volume.clone());
    }
    write_output(&command.to_shell(), None)
}

fn handle_recipe(args: &RecipeArgs, recipe: Option<PathBuf>) -> i32 {
    let Some((_, recipe)) = load_settings(recipe) else {
        return 1;
    };
    match OutputFormatter::new(args.format.into()).format_recipe(&recipe) {
        Ok(content) => write_output(&content, None),
        Err(e) => {
            error!("Failed to format output: {:#}", e);
            1
        }
    }
}

async fn handle_build(args: &BuildArgs, recipe: Option<PathBuf>, quiet: bool) -> i32 {
    let Some((config, recipe)) = load_settings(recipe) else {
        return 1;
    };
    let Some(variant) = parse_variant(args.variant()) else {
        return 1;
    };

    let context_path = match args.context.canonicalize() {
        Ok(path) => path,
        Err(e) => {
            error!(
                "Build context {} is not accessible: {}",
                args.context.display(),
                e
            );
            return 1;
        }
    };

    let fs = RealFileSystem::new();
    let report = match BuildContext::new(&fs, context_path.clone()).inspect(&recipe, &variant) {
        Ok(report) => report,
        Err(e) => {
            error!("Build context check failed: {:#}", e);
            return 1;
        }
    };
    debug!("Build context has {} warnings", report.warnings.len());

    let orchestrator = PipelineOrchestrator::new(progress_handler(quiet));
    let image = match orchestrator.execute(&recipe, &variant, &report.source) {
        Ok(image) => image,
        Err(e) => {
            error!("Failed to assemble image definition: {:#}", e);
            return 1;
        }
    };
    let requirements = match RequirementsRef::resolve(&recipe.builder.requirements, &variant) {
        Ok(requirements) => requirements,
        Err(e) => {
            error!("{}", e);
            return 1;
        }
    };

    let request = BuildRequest {
        context: context_path,
        dockerfile: image.to_dockerfile(),
        tag: args.tag.clone().unwrap_or_else(|| config.image_tag.clone()),
        requirements,
        dry_run: args.dry_run,
    };

    let mut builder = ImageBuilder::new(config.build_tool.clone());
    if let Some(handler) = progress_handler(quiet) {
        builder = builder.with_progress(handler);
    }

    if args.dry_run {
        println!("{}", builder.command_line(&request).join(" "));
    }

    match builder.build(&request).await {
        Ok(()) => {
            if !args.dry_run {
                info!("Built image {}", request.tag);
            }
            0
        }
        Err(e) => {
            error!("Image build failed: {:#}", e);
            match e.downcast_ref::<PackagingError>() {
                Some(PackagingError::BuildToolFailed {
                    code: Some(code), ..
                }) if *code != 0 => i32::try_from(*code).unwrap_or(1),
                _ => 1,
            }
        }
    }
}
