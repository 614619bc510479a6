use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("msgpipe {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: msgpipe");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "build_target: {}",
        option_env!("MSGPIPE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "wire: struct_version={} alignment={} max_message_size={}",
        msgpipe_frame::STRUCT_VERSION,
        msgpipe_frame::ALIGNMENT,
        msgpipe_transport::DEFAULT_MAX_MESSAGE_SIZE
    );
    println!("features: async={}, cli=true", cfg!(feature = "async"));

    Ok(SUCCESS)
}
