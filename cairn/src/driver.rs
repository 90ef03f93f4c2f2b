use codespan_reporting::diagnostic::{Diagnostic, Severity};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term::termcolor::{
    BufferedStandardStream, ColorChoice, NoColor, WriteColor,
};
use std::cell::RefCell;
use std::io::{Read, Write};
use std::path::Path;

use crate::ir::pretty;
use crate::ir::Program;
use crate::pass::{PassKind, PassManager};
use crate::reader;
use crate::source::FileId;

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

fn stream_color_choice(stream: atty::Stream) -> ColorChoice {
    match atty::is(stream) {
        true => ColorChoice::Auto,
        false => ColorChoice::Never,
    }
}

pub struct Driver {
    files: SimpleFiles<String, String>,
    passes: PassManager,
    show_ir: bool,

    seen_errors: RefCell<bool>,
    codespan_config: codespan_reporting::term::Config,
    diagnostic_writer: RefCell<Box<dyn WriteColor>>,

    emit_width: usize,
    emit_writer: RefCell<Box<dyn WriteColor>>,
}

impl Driver {
    pub fn new() -> Driver {
        Driver {
            files: SimpleFiles::new(),
            passes: PassManager::default(),
            show_ir: false,

            seen_errors: RefCell::new(false),
            codespan_config: codespan_reporting::term::Config::default(),
            diagnostic_writer: RefCell::new(Box::new(BufferedStandardStream::stderr(
                stream_color_choice(atty::Stream::Stderr),
            ))),

            emit_width: usize::MAX,
            emit_writer: RefCell::new(Box::new(BufferedStandardStream::stdout(
                stream_color_choice(atty::Stream::Stdout),
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
                .with_message(format!("cairn panicked at '{message}'"))
                .with_notes(vec![
                    match location {
                        Some(location) => format!("panicked at: {location}"),
                        None => "panicked at: unknown location".to_owned(),
                    },
                    "please file a bug report".to_owned(),
                ]);

            let mut writer =
                BufferedStandardStream::stderr(stream_color_choice(atty::Stream::Stderr));
            let dummy_files = SimpleFiles::<String, String>::new();

            default_hook(info);
            eprintln!();
            // Nothing more can be done if stderr is gone
            let _ =
                codespan_reporting::term::emit(&mut writer, &term_config, &dummy_files, &diagnostic);
            let _ = writer.flush();
        }));
    }

    /// Set the passes to run, in order
    pub fn set_passes(&mut self, kinds: &[PassKind]) {
        self.passes = PassManager::from_kinds(kinds);
    }

    /// Set to true to annotate emitted programs with the kind of each node
    pub fn set_show_ir(&mut self, show_ir: bool) {
        self.show_ir = show_ir;
    }

    /// Set the writer to use when rendering diagnostics
    pub fn set_diagnostic_writer(&mut self, stream: impl 'static + WriteColor) {
        self.diagnostic_writer = RefCell::new(Box::new(stream) as Box<dyn WriteColor>);
    }

    /// Set the width to use when emitting programs
    pub fn set_emit_width(&mut self, emit_width: usize) {
        self.emit_width = emit_width;
    }

    /// Set the writer to use when emitting programs
    pub fn set_emit_writer(&mut self, stream: impl 'static + WriteColor) {
        self.emit_writer = RefCell::new(Box::new(stream) as Box<dyn WriteColor>);
    }

    /// Emit programs to a newly created file at the given path.
    pub fn set_emit_path(&mut self, path: &Path) -> Option<()> {
        match std::fs::File::create(path) {
            Ok(file) => {
                self.set_emit_writer(NoColor::new(file));
                Some(())
            }
            Err(error) => {
                let diagnostic = Diagnostic::error()
                    .with_message(format!("couldn't create `{}`: {error}", path.display()));
                self.emit_diagnostic(diagnostic);
                None
            }
        }
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

    /// Read a program, run the configured passes over it, then emit the result.
    pub fn lower_and_emit(&mut self, file_id: FileId) -> Status {
        let program = match self.read_program(file_id) {
            Some(program) => program,
            None => return Status::Error,
        };

        let program = self.passes.run(program);
        self.emit_program(&program);

        match *self.seen_errors.borrow() {
            true => Status::Error,
            false => Status::Ok,
        }
    }

    fn read_program(&self, file_id: FileId) -> Option<Program> {
        let source = match self.files.get(file_id) {
            Ok(file) => file.source(),
            Err(error) => {
                self.emit_diagnostic(
                    Diagnostic::bug().with_message(format!("missing source file: {error}")),
                );
                return None;
            }
        };

        match reader::read_program(file_id, source) {
            Ok(program) => Some(program),
            Err(messages) => {
                self.emit_diagnostics(messages.iter().map(|message| message.to_diagnostic()));
                None
            }
        }
    }

    fn emit_program(&self, program: &Program) {
        let context = pretty::Context::with_ir_annotations(self.show_ir);
        self.emit_doc(context.program(program));
    }

    fn emit_doc(&self, doc: ::pretty::RcDoc) {
        let mut emit_writer = self.emit_writer.borrow_mut();
        let result = writeln!(emit_writer, "{}", doc.pretty(self.emit_width))
            .and_then(|()| emit_writer.flush());

        if let Err(error) = result {
            drop(emit_writer);
            self.emit_diagnostic(
                Diagnostic::error().with_message(format!("couldn't write output: {error}")),
            );
        }
    }

    fn emit_diagnostic(&self, diagnostic: Diagnostic<FileId>) {
        let mut writer = self.diagnostic_writer.borrow_mut();
        let config = &self.codespan_config;

        let result = codespan_reporting::term::emit(&mut *writer, config, &self.files, &diagnostic)
            .map_err(|error| error.to_string())
            .and_then(|()| writer.flush().map_err(|error| error.to_string()));
        if let Err(error) = result {
            log::error!("failed to emit diagnostic: {error}");
        }

        if diagnostic.severity >= Severity::Error {
            *self.seen_errors.borrow_mut() = true;
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
}

impl Default for Driver {
    fn default() -> Driver {
        Driver::new()
    }
}
