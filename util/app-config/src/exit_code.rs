/// Process exit statuses, following the sysexits convention where one fits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitCode {
    /// Command line parsing failed.
    Cli,
    /// The configuration is unusable: bad `.env`, unloadable control program.
    Config,
    /// An IO failure outside the configuration, e.g. the state directory.
    Io,
    /// Everything else.
    Failure,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        match code {
            ExitCode::Cli => 64,
            ExitCode::Config => 65,
            ExitCode::Io => 74,
            ExitCode::Failure => 1,
        }
    }
}

impl From<std::io::Error> for ExitCode {
    fn from(_: std::io::Error) -> ExitCode {
        ExitCode::Io
    }
}
