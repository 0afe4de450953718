//! Port driver trait and scheme registry (spec §6, §9 open question).
//!
//! No concrete OS driver (file/tcp/console) ships in this crate — per
//! spec §1's Non-goals, external I/O backends are out of scope. What
//! lives here is the seam an external driver plugs into: a scheme-keyed
//! registry resolving a URL-ish string or a pre-parsed `PortOptions` to
//! a `PortDriver` implementation, and the open/read/write/seek/waitFD
//! contract every driver must satisfy.
//!
//! §9 leaves block-mode open syntax (`open ['tcp "host" port]`) as an
//! open question; this module resolves it by not parsing that literal
//! at all — `open()` takes either a plain string spec or an already-built
//! `PortOptions`, and any block-literal sugar is the evaluator's job, not
//! this registry's (see DESIGN.md).

use std::collections::HashMap;

use boron_core::BoronError;

use crate::buffer::BufferData;

/// Parsed connection parameters a driver needs to open a port, already
/// stripped of any block-literal syntax (spec §9 open question).
#[derive(Debug, Clone, Default)]
pub struct PortOptions {
    pub scheme: String,
    pub path: String,
    pub args: Vec<String>,
    pub read: bool,
    pub write: bool,
}

impl PortOptions {
    /// Parse a `scheme://path` or bare-path spec; bare paths default to
    /// the `file` scheme.
    pub fn from_spec(spec: &str) -> PortOptions {
        match spec.split_once("://") {
            Some((scheme, rest)) => PortOptions { scheme: scheme.to_string(), path: rest.to_string(), read: true, write: true, args: Vec::new() },
            None => PortOptions { scheme: "file".to_string(), path: spec.to_string(), read: true, write: true, args: Vec::new() },
        }
    }
}

/// What result a port read/write leaves behind. Matches the shapes the
/// buffer store already knows how to hold, so a driver can hand data
/// straight back to the caller without an extra copy into a new type.
pub enum PortData {
    Bytes(Vec<u8>),
    Eof,
    WouldBlock,
}

/// A single open port. Implementors own whatever OS handle they need;
/// this crate only defines the shape of the interaction.
pub trait PortDriver: Send {
    fn open(&mut self, opts: &PortOptions) -> Result<(), BoronError>;
    fn close(&mut self) -> Result<(), BoronError>;
    fn read(&mut self, max_len: usize) -> Result<PortData, BoronError>;
    fn write(&mut self, data: &[u8]) -> Result<usize, BoronError>;
    fn seek(&mut self, offset: i64, from_end: bool) -> Result<u64, BoronError>;
    /// Block (or poll, at the driver's discretion) until the port's
    /// underlying descriptor is ready for I/O.
    fn wait_fd(&mut self) -> Result<(), BoronError>;
}

/// A constructor for a scheme's driver, registered once at startup.
pub type DriverFactory = fn() -> Box<dyn PortDriver>;

/// Scheme-keyed registry resolving `"file"`, `"console"`, `"tcp"`, ... to
/// a driver factory. Empty by default; a host binary registers whatever
/// concrete drivers it links in.
#[derive(Default)]
pub struct PortRegistry {
    factories: HashMap<String, DriverFactory>,
}

impl PortRegistry {
    pub fn new() -> PortRegistry {
        PortRegistry { factories: HashMap::new() }
    }

    pub fn register(&mut self, scheme: &str, factory: DriverFactory) {
        self.factories.insert(scheme.to_string(), factory);
    }

    /// Build and open a driver for `opts.scheme`, or a Script-kind error
    /// if no driver is registered for that scheme (spec §7: unsupported
    /// scheme is a script-level fault, not an access fault, since it's a
    /// caller mistake rather than a resource refusal).
    pub fn open(&self, opts: &PortOptions) -> Result<Box<dyn PortDriver>, BoronError> {
        let factory = self
            .factories
            .get(opts.scheme.as_str())
            .ok_or_else(|| BoronError::script(format!("no port driver registered for scheme '{}'", opts.scheme)))?;
        let mut driver = factory();
        driver.open(opts)?;
        Ok(driver)
    }

    pub fn has_scheme(&self, scheme: &str) -> bool {
        self.factories.contains_key(scheme)
    }
}

/// Wrap a completed read into the `Binary`/`String` buffer shape a port
/// primitive would hand back to the evaluator.
pub fn read_result_to_buffer(result: PortData) -> Option<BufferData> {
    match result {
        PortData::Bytes(b) => Some(BufferData::Bytes(b)),
        PortData::Eof | PortData::WouldBlock => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MemoryDriver {
        data: Vec<u8>,
        cursor: usize,
    }

    impl PortDriver for MemoryDriver {
        fn open(&mut self, _opts: &PortOptions) -> Result<(), BoronError> {
            Ok(())
        }
        fn close(&mut self) -> Result<(), BoronError> {
            Ok(())
        }
        fn read(&mut self, max_len: usize) -> Result<PortData, BoronError> {
            if self.cursor >= self.data.len() {
                return Ok(PortData::Eof);
            }
            let end = (self.cursor + max_len).min(self.data.len());
            let chunk = self.data[self.cursor..end].to_vec();
            self.cursor = end;
            Ok(PortData::Bytes(chunk))
        }
        fn write(&mut self, data: &[u8]) -> Result<usize, BoronError> {
            self.data.extend_from_slice(data);
            Ok(data.len())
        }
        fn seek(&mut self, offset: i64, from_end: bool) -> Result<u64, BoronError> {
            let base = if from_end { self.data.len() as i64 } else { 0 };
            self.cursor = (base + offset).max(0) as usize;
            Ok(self.cursor as u64)
        }
        fn wait_fd(&mut self) -> Result<(), BoronError> {
            Ok(())
        }
    }

    fn memory_driver_factory() -> Box<dyn PortDriver> {
        Box::new(MemoryDriver { data: Vec::new(), cursor: 0 })
    }

    #[test]
    fn options_from_spec_splits_scheme_and_path() {
        let opts = PortOptions::from_spec("tcp://example.com:80");
        assert_eq!(opts.scheme, "tcp");
        assert_eq!(opts.path, "example.com:80");
    }

    #[test]
    fn bare_path_defaults_to_file_scheme() {
        let opts = PortOptions::from_spec("/tmp/out.txt");
        assert_eq!(opts.scheme, "file");
        assert_eq!(opts.path, "/tmp/out.txt");
    }

    #[test]
    fn unregistered_scheme_is_a_script_error() {
        let registry = PortRegistry::new();
        let opts = PortOptions::from_spec("tcp://example.com");
        let err = registry.open(&opts).unwrap_err();
        assert_eq!(err.kind, boron_core::ErrorKind::Script);
    }

    #[test]
    fn registered_scheme_opens_and_round_trips_write_then_read() {
        let mut registry = PortRegistry::new();
        registry.register("mem", memory_driver_factory);
        let opts = PortOptions::from_spec("mem://scratch");
        let mut driver = registry.open(&opts).unwrap();

        driver.write(b"hello").unwrap();
        driver.seek(0, false).unwrap();
        match driver.read(5).unwrap() {
            PortData::Bytes(b) => assert_eq!(b, b"hello"),
            _ => panic!("expected bytes"),
        }
    }

    #[test]
    fn read_past_end_reports_eof() {
        let mut registry = PortRegistry::new();
        registry.register("mem", memory_driver_factory);
        let mut driver = registry.open(&PortOptions::from_spec("mem://x")).unwrap();
        match driver.read(16).unwrap() {
            PortData::Eof => {}
            _ => panic!("expected eof on an empty driver"),
        }
    }
}
