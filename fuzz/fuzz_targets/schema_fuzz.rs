//! Schema fuzz target: feed arbitrary bytes to the XML front end and, when
//! they parse, to the protocol validator and generator tree.
//! Nothing may panic; every failure must come back as an error.
//! Build with: cargo fuzz run schema_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let s = match std::str::from_utf8(data) {
        Ok(x) => x,
        Err(_) => return,
    };
    let config = commsdsl::GenConfig {
        min_level: commsdsl::Severity::Error,
        ..Default::default()
    };
    let logger = commsdsl::Logger::with_callback(config.protocol_config().logger, Box::new(|_, _| {}));
    let mut protocol = commsdsl::Protocol::with_logger(config.protocol_config(), logger);
    if protocol.parse_str(s, "fuzz.xml").is_err() || protocol.validate().is_err() {
        return;
    }
    if let Ok(gen) = commsdsl::Generator::prepare(&protocol, config) {
        let _ = commsdsl::dump::dump(&gen);
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run schema_fuzz");
}
