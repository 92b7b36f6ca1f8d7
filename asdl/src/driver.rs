use codespan_reporting::diagnostic::Diagnostic;
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term::termcolor::{BufferedStandardStream, ColorChoice, WriteColor};
use std::cell::RefCell;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::core::binary::{self, read};
use crate::core::{DeclId, Desc, TypeLookup};
use crate::files::{FileId, Files};
use crate::pass::{core_to_c, core_to_cpp, core_to_python};
use crate::surface::{self, elaboration, instance, validation};
use crate::BUG_REPORT_NOTE;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
}

impl Status {
    pub fn exit_code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::Error => 1,
        }
    }
}

pub struct Driver {
    files: Files,
    app_types: Vec<String>,
    binary_params: binary::Params,

    codespan_config: codespan_reporting::term::Config,
    diagnostic_writer: RefCell<Box<dyn WriteColor>>,

    emit_width: usize,
    emit_writer: RefCell<Box<dyn WriteColor>>,
}

impl Driver {
    pub fn new() -> Driver {
        Driver {
            files: Files::new(),
            app_types: Vec::new(),
            binary_params: binary::Params::default(),

            codespan_config: codespan_reporting::term::Config::default(),
            diagnostic_writer: RefCell::new(Box::new(BufferedStandardStream::stderr(
                if atty::is(atty::Stream::Stderr) {
                    ColorChoice::Auto
                } else {
                    ColorChoice::Never
                },
            ))),

            emit_width: usize::MAX,
            emit_writer: RefCell::new(Box::new(BufferedStandardStream::stdout(
                if atty::is(atty::Stream::Stdout) {
                    ColorChoice::Auto
                } else {
                    ColorChoice::Never
                },
            ))),
        }
    }

    /// Setup a global panic hook
    pub fn install_panic_hook(&self) {
        // Use the currently set codespan configuration
        let term_config = self.codespan_config.clone();
        // Fetch the default hook (which prints the panic message and an optional backtrace)
        let default_hook = std::panic::take_hook();

        std::panic::set_hook(Box::new(move |info| {
            let location = info.location();
            let message = if let Some(message) = info.payload().downcast_ref::<String>() {
                message.as_str()
            } else if let Some(message) = info.payload().downcast_ref::<&str>() {
                message
            } else {
                "unknown panic type"
            };

            let diagnostic = Diagnostic::bug()
                .with_message(format!("compiler panicked at '{message}'"))
                .with_notes(vec![
                    match location {
                        Some(location) => format!("panicked at: {location}"),
                        None => "panicked at: unknown location".to_owned(),
                    },
                    BUG_REPORT_NOTE.to_owned(),
                ]);

            let mut writer = BufferedStandardStream::stderr(if atty::is(atty::Stream::Stderr) {
                ColorChoice::Auto
            } else {
                ColorChoice::Never
            });
            let dummy_files = SimpleFiles::<String, String>::new();

            default_hook(info);
            eprintln!();
            // Nothing more can be done if stderr is gone
            let _ = codespan_reporting::term::emit(
                &mut writer,
                &term_config,
                &dummy_files,
                &diagnostic,
            );
        }));
    }

    /// Set the writer to use when rendering diagnostics
    pub fn set_diagnostic_writer(&mut self, stream: impl 'static + WriteColor) {
        self.diagnostic_writer = RefCell::new(Box::new(stream) as Box<dyn WriteColor>);
    }

    /// Set the width to use when formatting schemas
    pub fn set_emit_width(&mut self, emit_width: usize) {
        self.emit_width = emit_width;
    }

    /// Set the writer to use when emitting generated code and values
    pub fn set_emit_writer(&mut self, stream: impl 'static + WriteColor) {
        self.emit_writer = RefCell::new(Box::new(stream) as Box<dyn WriteColor>);
    }

    /// Types supplied by the application, usable in any schema without a
    /// `use` declaration.
    pub fn set_app_types(&mut self, app_types: Vec<String>) {
        self.app_types = app_types;
    }

    pub fn set_binary_params(&mut self, params: binary::Params) {
        self.binary_params = params;
    }

    /// Load a source string into the file database.
    pub fn load_source_string(&mut self, name: String, source: String) -> FileId {
        self.files.add(name, source)
    }

    /// Load a source file into the file database using a reader.
    pub fn load_source(&mut self, name: String, mut reader: impl Read) -> Option<FileId> {
        let mut source = String::new();
        match reader.read_to_string(&mut source) {
            Ok(_) => Some(self.load_source_string(name, source)),
            Err(error) => {
                self.emit_read_diagnostic(name, error);
                None
            }
        }
    }

    /// Load a source file into the file database from the given path.
    pub fn load_source_path(&mut self, path: &Path) -> Option<FileId> {
        match std::fs::File::open(path) {
            Ok(file) => self.load_source(path.display().to_string(), file),
            Err(error) => {
                self.emit_read_diagnostic(path.display(), error);
                None
            }
        }
    }

    /// Read all the bytes from a reader into a vector.
    pub fn read_bytes(&mut self, name: String, mut reader: impl Read) -> Option<Vec<u8>> {
        let mut bytes = Vec::new();
        match reader.read_to_end(&mut bytes) {
            Ok(_) => Some(bytes),
            Err(error) => {
                self.emit_read_diagnostic(name, error);
                None
            }
        }
    }

    /// Read all the bytes in a given file.
    pub fn read_bytes_path(&mut self, path: &Path) -> Option<Vec<u8>> {
        match std::fs::File::open(path) {
            Ok(file) => self.read_bytes(path.display().to_string(), file),
            Err(error) => {
                self.emit_read_diagnostic(path.display(), error);
                None
            }
        }
    }

    /// Parse, validate and resolve a schema.
    pub fn check_module(&mut self, file_id: FileId) -> Status {
        match self.resolve_module(file_id) {
            Some(_) => Status::Ok,
            None => Status::Error,
        }
    }

    /// Print a schema in canonical form.
    pub fn format_module(&mut self, file_id: FileId) -> Status {
        let module = match self.parse_module(file_id) {
            Some(module) => module,
            None => return Status::Error,
        };
        self.emit_text(&surface::pretty::module_to_string(&module, self.emit_width))
    }

    pub fn emit_python(&mut self, file_id: FileId) -> Status {
        match self.resolve_module(file_id) {
            Some(lookup) => self.emit_text(&core_to_python::from_lookup(&lookup)),
            None => Status::Error,
        }
    }

    pub fn emit_c(&mut self, file_id: FileId) -> Status {
        match self.resolve_module(file_id) {
            Some(lookup) => self.emit_text(&core_to_c::from_lookup(&lookup)),
            None => Status::Error,
        }
    }

    /// Write the C++ header and source to `<out_prefix>.h` and
    /// `<out_prefix>.cc`. Either both files are written or neither is.
    pub fn write_cpp(&mut self, file_id: FileId, out_prefix: &Path) -> Status {
        let lookup = match self.resolve_module(file_id) {
            Some(lookup) => lookup,
            None => return Status::Error,
        };

        let header_path = with_suffix(out_prefix, ".h");
        let source_path = with_suffix(out_prefix, ".cc");
        let header_name = match header_path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => {
                self.emit_diagnostic(Diagnostic::error().with_message(format!(
                    "`{}` is not a valid output prefix",
                    out_prefix.display(),
                )));
                return Status::Error;
            }
        };

        let output = core_to_cpp::from_lookup(&lookup, &header_name);

        // Both files are complete before either is moved into place
        let header_file = match write_temp(&header_path, output.header.as_bytes()) {
            Ok(file) => file,
            Err(error) => {
                self.emit_write_diagnostic(header_path.display(), error);
                return Status::Error;
            }
        };
        let source_file = match write_temp(&source_path, output.source.as_bytes()) {
            Ok(file) => file,
            Err(error) => {
                self.emit_write_diagnostic(source_path.display(), error);
                return Status::Error;
            }
        };

        if let Err(error) = header_file.persist(&header_path) {
            self.emit_write_diagnostic(header_path.display(), error.error);
            return Status::Error;
        }
        if let Err(error) = source_file.persist(&source_path) {
            self.emit_write_diagnostic(source_path.display(), error.error);
            if let Err(error) = std::fs::remove_file(&header_path) {
                tracing::warn!(path = %header_path.display(), %error, "failed to remove header");
            }
            return Status::Error;
        }

        tracing::debug!(
            header = %header_path.display(),
            source = %source_path.display(),
            "wrote C++ output",
        );
        Status::Ok
    }

    /// Encode the value in `value_file_id` as an OHeap blob, writing it to
    /// `out_path` once it is complete.
    pub fn encode_value(
        &mut self,
        schema_file_id: FileId,
        type_name: &str,
        value_file_id: FileId,
        out_path: &Path,
    ) -> Status {
        let lookup = match self.resolve_module(schema_file_id) {
            Some(lookup) => lookup,
            None => return Status::Error,
        };
        let desc = match self.root_type(&lookup, type_name) {
            Some((_, desc)) => desc,
            None => return Status::Error,
        };

        let source = match self.files.source(value_file_id) {
            Ok(source) => source,
            Err(error) => {
                self.emit_diagnostic(Diagnostic::bug().with_message(error.to_string()));
                return Status::Error;
            }
        };
        let value = match instance::parse_value(&lookup, value_file_id, source, &desc) {
            Ok(value) => value,
            Err(error) => {
                self.emit_diagnostic(error.to_diagnostic());
                return Status::Error;
            }
        };

        let mut blob = Cursor::new(Vec::new());
        let context = binary::Context::new(&lookup, self.binary_params);
        if let Err(error) = context.encode(&mut blob, &value) {
            self.emit_diagnostic(
                Diagnostic::error()
                    .with_message(format!("failed to encode value of type `{type_name}`"))
                    .with_notes(vec![error.to_string()]),
            );
            return Status::Error;
        }

        let blob = blob.into_inner();
        let result = write_temp(out_path, &blob)
            .and_then(|file| file.persist(out_path).map_err(|error| error.error));
        if let Err(error) = result {
            self.emit_write_diagnostic(out_path.display(), error);
            return Status::Error;
        }

        tracing::debug!(path = %out_path.display(), bytes = blob.len(), "wrote OHeap blob");
        Status::Ok
    }

    /// Decode an OHeap blob whose root has type `type_name`, printing the
    /// value in instance notation.
    pub fn decode_value(&mut self, schema_file_id: FileId, type_name: &str, blob: &[u8]) -> Status {
        let lookup = match self.resolve_module(schema_file_id) {
            Some(lookup) => lookup,
            None => return Status::Error,
        };
        let id = match self.root_type(&lookup, type_name) {
            Some((id, _)) => id,
            None => return Status::Error,
        };

        let context = read::Context::new(&lookup, self.binary_params);
        match context.read(&mut Cursor::new(blob), id) {
            Ok(value) => self.emit_text(&format!("{}\n", value.display(&lookup))),
            Err(error) => {
                self.emit_diagnostic(
                    Diagnostic::error()
                        .with_message(format!("failed to decode value of type `{type_name}`"))
                        .with_notes(vec![error.to_string()]),
                );
                Status::Error
            }
        }
    }

    fn parse_module(&self, file_id: FileId) -> Option<surface::Module> {
        let source = match self.files.source(file_id) {
            Ok(source) => source,
            Err(error) => {
                self.emit_diagnostic(Diagnostic::bug().with_message(error.to_string()));
                return None;
            }
        };

        match surface::Module::parse(file_id, source) {
            Ok(module) => Some(module),
            Err(error) => {
                self.emit_diagnostic(error.to_diagnostic());
                None
            }
        }
    }

    fn resolve_module(&self, file_id: FileId) -> Option<TypeLookup> {
        let module = self.parse_module(file_id)?;

        if let Err(messages) = validation::check(&module) {
            self.emit_diagnostics(messages.iter().map(|message| message.to_diagnostic()));
            return None;
        }

        match elaboration::elaborate(&module, &self.app_types) {
            Ok(lookup) => Some(lookup),
            Err(error) => {
                self.emit_diagnostic(error.to_diagnostic());
                None
            }
        }
    }

    /// The declaration that an encoded value is rooted at.
    fn root_type(&self, lookup: &TypeLookup, type_name: &str) -> Option<(DeclId, Desc)> {
        match lookup.by_type_name(type_name) {
            Some(desc) => match desc {
                Desc::Sum(id) | Desc::Product(id) => Some((*id, desc.clone())),
                _ => {
                    self.emit_diagnostic(Diagnostic::error().with_message(format!(
                        "`{type_name}` is not declared in `{}`",
                        lookup.module_name(),
                    )));
                    None
                }
            },
            None => {
                self.emit_diagnostic(Diagnostic::error().with_message(format!(
                    "cannot find type `{type_name}` in `{}`",
                    lookup.module_name(),
                )));
                None
            }
        }
    }

    fn emit_text(&self, text: &str) -> Status {
        let mut emit_writer = self.emit_writer.borrow_mut();
        let result = emit_writer.write_all(text.as_bytes()).and_then(|()| emit_writer.flush());
        drop(emit_writer);

        match result {
            Ok(()) => Status::Ok,
            Err(error) => {
                self.emit_write_diagnostic("<stdout>", error);
                Status::Error
            }
        }
    }

    fn emit_diagnostic(&self, diagnostic: Diagnostic<FileId>) {
        let mut writer = self.diagnostic_writer.borrow_mut();
        let config = &self.codespan_config;

        let result = codespan_reporting::term::emit(&mut *writer, config, &self.files, &diagnostic)
            .map_err(|error| error.to_string())
            .and_then(|()| writer.flush().map_err(|error| error.to_string()));
        if let Err(error) = result {
            tracing::error!(%error, "failed to render diagnostic");
        }
    }

    fn emit_diagnostics(&self, diagnostics: impl Iterator<Item = Diagnostic<FileId>>) {
        for diagnostic in diagnostics {
            self.emit_diagnostic(diagnostic);
        }
    }

    fn emit_read_diagnostic(&self, name: impl std::fmt::Display, error: std::io::Error) {
        let diagnostic =
            Diagnostic::error().with_message(format!("couldn't read `{name}`: {error}"));
        self.emit_diagnostic(diagnostic);
    }

    fn emit_write_diagnostic(&self, name: impl std::fmt::Display, error: std::io::Error) {
        let diagnostic =
            Diagnostic::error().with_message(format!("couldn't write `{name}`: {error}"));
        self.emit_diagnostic(diagnostic);
    }
}

impl Default for Driver {
    fn default() -> Driver {
        Driver::new()
    }
}

/// `out/demo` to `out/demo.h`. Unlike [`Path::with_extension`], dots already
/// in the prefix are kept.
/// Write `contents` to a temporary file in the directory of `path`, ready to
/// be persisted over it.
fn write_temp(path: &Path, contents: &[u8]) -> std::io::Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(contents)?;
    file.flush()?;
    Ok(file)
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut path = prefix.as_os_str().to_owned();
    path.push(suffix);
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use codespan_reporting::term::termcolor::NoColor;
    use std::rc::Rc;

    use super::*;

    /// A writer that can be inspected after being handed to the driver.
    #[derive(Clone, Default)]
    struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn driver() -> (Driver, SharedBuffer, SharedBuffer) {
        let stdout = SharedBuffer::default();
        let stderr = SharedBuffer::default();

        let mut driver = Driver::new();
        driver.set_emit_writer(NoColor::new(stdout.clone()));
        driver.set_diagnostic_writer(NoColor::new(stderr.clone()));
        (driver, stdout, stderr)
    }

    /// An output prefix in a fresh directory, removed when the guard drops.
    fn temp_prefix() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("demo");
        (dir, prefix)
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut entries: Vec<_> = (std::fs::read_dir(dir).unwrap())
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        entries.sort();
        entries
    }

    const DEMO: &str = "module demo {
        color = Red | Green | Blue
        point = (int x, int y, color c)
    }";

    #[test]
    fn check_reports_unknown_type() {
        let (mut driver, _, stderr) = driver();
        let source = "module m { t = (intt x) }";
        let file_id = driver.load_source_string("bad.asdl".to_owned(), source.to_owned());

        assert_eq!(driver.check_module(file_id), Status::Error);
        let stderr = stderr.contents();
        assert!(stderr.contains("error: cannot find type `intt` used in `t`"), "{stderr}");
        assert!(stderr.contains("bad.asdl"), "{stderr}");
    }

    #[test]
    fn check_reports_every_validation_error() {
        let (mut driver, _, stderr) = driver();
        let source = "module m { t = A(int a) | A(int b)  u = (int x, int x) }";
        let file_id = driver.load_source_string("dup.asdl".to_owned(), source.to_owned());

        assert_eq!(driver.check_module(file_id), Status::Error);
        let stderr = stderr.contents();
        assert!(stderr.contains("redefinition of constructor `A`"), "{stderr}");
        assert!(stderr.contains("field `x` is declared more than once in `u`"), "{stderr}");
    }

    #[test]
    fn c_output_goes_to_emit_writer() {
        let (mut driver, stdout, stderr) = driver();
        let file_id = driver.load_source_string("demo.asdl".to_owned(), DEMO.to_owned());

        assert_eq!(driver.emit_c(file_id), Status::Ok);
        assert!(stdout.contents().contains("#define color__Blue 3\n"));
        assert_eq!(stderr.contents(), "");
    }

    #[test]
    fn cpp_writes_header_and_source() {
        let (mut driver, _, _) = driver();
        let file_id = driver.load_source_string("demo.asdl".to_owned(), DEMO.to_owned());
        let (dir, prefix) = temp_prefix();

        assert_eq!(driver.write_cpp(file_id, &prefix), Status::Ok);
        let header = std::fs::read_to_string(with_suffix(&prefix, ".h")).unwrap();
        let source = std::fs::read_to_string(with_suffix(&prefix, ".cc")).unwrap();
        assert!(header.contains("class point {"));
        assert!(source.contains("#include \"demo.h\""));
        assert_eq!(dir_entries(dir.path()), ["demo.cc", "demo.h"]);
    }

    #[test]
    fn cpp_failure_leaves_no_header() {
        let (mut driver, _, stderr) = driver();
        let file_id = driver.load_source_string("demo.asdl".to_owned(), DEMO.to_owned());
        let (dir, prefix) = temp_prefix();
        // A directory where the source file should go
        std::fs::create_dir_all(with_suffix(&prefix, ".cc")).unwrap();

        assert_eq!(driver.write_cpp(file_id, &prefix), Status::Error);
        assert!(!with_suffix(&prefix, ".h").exists());
        assert!(stderr.contents().contains("couldn't write"));
        assert_eq!(dir_entries(dir.path()), ["demo.cc"]);
    }

    #[test]
    fn cpp_into_missing_directory_writes_nothing() {
        let (mut driver, _, stderr) = driver();
        let file_id = driver.load_source_string("demo.asdl".to_owned(), DEMO.to_owned());
        let (dir, prefix) = temp_prefix();
        let prefix = prefix.with_file_name("missing").join("demo");

        assert_eq!(driver.write_cpp(file_id, &prefix), Status::Error);
        assert!(stderr.contents().contains("couldn't write"));
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[test]
    fn encode_then_decode() {
        let (mut driver, stdout, stderr) = driver();
        let schema = driver.load_source_string("demo.asdl".to_owned(), DEMO.to_owned());
        let value = driver.load_source_string("value".to_owned(), "point(1, 2, Blue)".to_owned());
        let (dir, prefix) = temp_prefix();
        let path = with_suffix(&prefix, ".oheap");

        let status = driver.encode_value(schema, "point", value, &path);
        assert_eq!(status, Status::Ok, "{}", stderr.contents());
        assert_eq!(dir_entries(dir.path()), ["demo.oheap"]);
        let blob = std::fs::read(&path).unwrap();
        assert_eq!(&blob[..4], b"OHP\x01");

        assert_eq!(driver.decode_value(schema, "point", &blob), Status::Ok);
        assert_eq!(stdout.contents(), "point(x = 1, y = 2, c = Blue)\n");
    }

    #[test]
    fn encode_rejects_enum_root() {
        let (mut driver, _, stderr) = driver();
        let schema = driver.load_source_string("demo.asdl".to_owned(), DEMO.to_owned());
        let value = driver.load_source_string("value".to_owned(), "Red".to_owned());
        let (_dir, prefix) = temp_prefix();
        let path = with_suffix(&prefix, ".oheap");

        assert_eq!(driver.encode_value(schema, "color", value, &path), Status::Error);
        assert!(stderr.contents().contains("the root value must be a record"));
        assert!(!path.exists());
    }

    #[test]
    fn unknown_root_type() {
        let (mut driver, _, stderr) = driver();
        let schema = driver.load_source_string("demo.asdl".to_owned(), DEMO.to_owned());

        assert_eq!(driver.decode_value(schema, "pointt", &[]), Status::Error);
        assert!(stderr.contents().contains("cannot find type `pointt` in `demo`"));
    }
}
