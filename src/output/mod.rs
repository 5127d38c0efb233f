pub mod schema;

pub use schema::{
    BuilderSpec, DirectorySpec, LaunchSpec, PackagingRecipe, RecipeMetadata, RequirementsSpec,
    RuntimeIdentity, RuntimeSpec,
};
