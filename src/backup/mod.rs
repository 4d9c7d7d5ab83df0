pub mod archive;
pub mod backup_config;
pub mod bootstrap;
pub mod compress;
pub mod exclusion;
pub mod finish;
pub mod orchestrator;
pub mod remote;
pub mod result_error;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
