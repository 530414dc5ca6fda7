use bugreport::{
    bugreport,
    collector::{
        CommandLine, CompileTimeInformation, EnvironmentVariables, OperatingSystem,
        SoftwareVersion,
    },
    format::Markdown,
};

// API keys are never part of the report
const REPORTED_VARIABLES: &[&str] = &[
    "SHELL",
    "TERM",
    "CI",
    "GITHUB_ACTIONS",
    "RFLOGS_BASE_URL",
    "RFLOGS_CONFIG",
    "RUST_LOG",
];

pub fn run() {
    bugreport!()
        .info(SoftwareVersion::default())
        .info(OperatingSystem::default())
        .info(CommandLine::default())
        .info(EnvironmentVariables::list(REPORTED_VARIABLES))
        .info(CompileTimeInformation::default())
        .print::<Markdown>();
}
