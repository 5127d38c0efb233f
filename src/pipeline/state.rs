//! Build state machine
//!
//! `Start -> BuilderStageComplete -> RuntimeStageAssembling -> ImageFinalized`.
//! Transitions only move forward one step; there is no resume after an error.

use crate::error::PackagingError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BuildState {
    Start,
    BuilderStageComplete,
    RuntimeStageAssembling,
    ImageFinalized,
}

impl BuildState {
    /// The only state reachable from this one
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Start => Some(Self::BuilderStageComplete),
            Self::BuilderStageComplete => Some(Self::RuntimeStageAssembling),
            Self::RuntimeStageAssembling => Some(Self::ImageFinalized),
            Self::ImageFinalized => None,
        }
    }

    pub fn advance(self, to: Self) -> Result<Self, PackagingError> {
        if self.next() == Some(to) {
            Ok(to)
        } else {
            Err(PackagingError::StageOrder {
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Self::ImageFinalized
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "Start",
            Self::BuilderStageComplete => "BuilderStageComplete",
            Self::RuntimeStageAssembling => "RuntimeStageAssembling",
            Self::ImageFinalized => "ImageFinalized",
        };
        f.write_str(name)
    }
}
