use framelink_conn::record::{HEADER_SIZE, MAGIC};
use framelink_conn::DEFAULT_MAX_MESSAGE;
use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Debug, Serialize)]
struct BuildInfo {
    name: &'static str,
    version: &'static str,
    target: &'static str,
    profile: &'static str,
    features: Features,
    wire: WireInfo,
}

#[derive(Debug, Serialize)]
struct Features {
    r#async: bool,
    cli: bool,
}

#[derive(Debug, Serialize)]
struct WireInfo {
    record_magic: String,
    record_header_bytes: usize,
    default_max_message_bytes: usize,
}

impl BuildInfo {
    fn collect() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            target: option_env!("FRAMELINK_BUILD_TARGET").unwrap_or("unknown"),
            profile: option_env!("FRAMELINK_BUILD_PROFILE").unwrap_or("unknown"),
            features: Features {
                r#async: cfg!(feature = "async"),
                cli: true,
            },
            wire: WireInfo {
                record_magic: String::from_utf8_lossy(&MAGIC).into_owned(),
                record_header_bytes: HEADER_SIZE,
                default_max_message_bytes: DEFAULT_MAX_MESSAGE,
            },
        }
    }
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    if !args.extended {
        println!("framelink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let info = BuildInfo::collect();
    if format == OutputFormat::Json {
        println!(
            "{}",
            serde_json::to_string(&info).unwrap_or_else(|_| "{}".to_string())
        );
        return Ok(SUCCESS);
    }

    println!("name: {}", info.name);
    println!("version: {}", info.version);
    println!("target: {}", info.target);
    println!("profile: {}", info.profile);
    println!(
        "features: async={}, cli={}",
        info.features.r#async, info.features.cli
    );
    println!(
        "wire: magic={:?} header={}B max_message={}B",
        info.wire.record_magic, info.wire.record_header_bytes, info.wire.default_max_message_bytes
    );

    Ok(SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_info_serializes_feature_names() {
        let value = serde_json::to_value(BuildInfo::collect()).unwrap();
        assert_eq!(value["name"], "framelink");
        assert!(value["features"]["async"].is_boolean());
        assert_eq!(value["wire"]["record_magic"], "FL");
        assert_eq!(value["wire"]["record_header_bytes"], 7);
    }
}
