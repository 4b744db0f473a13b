use execctx_core::{CommandFactory, CommandSpec};

/// Platform-independent factory that selects the appropriate implementation at compile time
pub struct PlatformCommandFactory;

impl CommandFactory for PlatformCommandFactory {
    #[cfg(unix)]
    type Command = execctx_unix::UnixCommand;

    fn create_command(spec: &CommandSpec) -> Self::Command {
        #[cfg(unix)]
        return execctx_unix::UnixCommandFactory::create_command(spec);
    }

    fn platform_name() -> &'static str {
        #[cfg(unix)]
        return execctx_unix::UnixCommandFactory::platform_name();
    }
}

/// Command type of the current platform
pub type PlatformCommand = <PlatformCommandFactory as CommandFactory>::Command;
