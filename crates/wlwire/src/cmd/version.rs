use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("wlwire {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: wlwire");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("WLWIRE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "build_profile: {}",
        option_env!("WLWIRE_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("native_byte_order: {}", wlwire_frame::ByteOrder::native());
    println!("max_message_size: {}", wlwire_frame::MAX_MESSAGE_SIZE);
    println!("max_fds_per_read: {}", wlwire_transport::DEFAULT_MAX_FDS);
    println!("features: async={}, cli=true", cfg!(feature = "async"));

    Ok(SUCCESS)
}
