pub mod play;
pub mod spotify;
pub mod stop;

pub mod audio_sources;
pub mod utils;

use crate::commands::{dispatch, router::Command};
use crate::{CommandResult, Context};
