use std::fmt::Display;

use proc_macro2::Span;

use crate::source_registry::{SourceId, SourceRegistry};

pub(crate) type SourceIdSpan = (SourceId, Span);

/// Error in binding declarations, points to place in declaration source
#[derive(Debug)]
pub(crate) struct DiagnosticError {
    data: Vec<(SourceId, syn::Error)>,
}

impl DiagnosticError {
    pub(crate) fn new<T: Display>(src_id: SourceId, sp: Span, err: T) -> Self {
        DiagnosticError {
            data: vec![(src_id, syn::Error::new(sp, err))],
        }
    }
    pub(crate) fn new2<T: Display>(sp: SourceIdSpan, err: T) -> Self {
        DiagnosticError::new(sp.0, sp.1, err)
    }
    /// Error not connected with any place in declarations
    pub(crate) fn without_span<T: Display>(err: T) -> Self {
        DiagnosticError::new(SourceId::none(), Span::call_site(), err)
    }
    pub(crate) fn from_syn_err(src_id: SourceId, err: syn::Error) -> Self {
        DiagnosticError {
            data: vec![(src_id, err)],
        }
    }
    pub(crate) fn span_note<T: Display>(&mut self, sp: SourceIdSpan, err: T) {
        self.data.push((sp.0, syn::Error::new(sp.1, err)));
    }
    pub(crate) fn add_span_note<T: Display>(mut self, sp: SourceIdSpan, err: T) -> Self {
        self.span_note(sp, err);
        self
    }

    /// Format error as `name:line:column: message`, one line per note
    pub(crate) fn render(&self, sources: &SourceRegistry) -> String {
        let mut ret = String::new();
        for (src_id, err) in &self.data {
            let start = err.span().start();
            if src_id.is_none() {
                ret.push_str(&format!("error: {}\n", err));
            } else {
                let src = sources.src_with_id(*src_id);
                ret.push_str(&format!(
                    "{}:{}:{}: {}\n",
                    src.id_of_code,
                    start.line,
                    start.column + 1,
                    err
                ));
            }
        }
        ret
    }
}

impl Display for DiagnosticError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        for (_, x) in &self.data {
            writeln!(f, "{}", x)?;
        }
        Ok(())
    }
}

impl std::error::Error for DiagnosticError {}

pub(crate) type Result<T> = std::result::Result<T, DiagnosticError>;

/// Declaration errors returned by [`crate::Bindings::build`], already rendered
/// against the registered sources
#[derive(Debug)]
pub struct BuildError {
    pub(crate) rendered: String,
}

impl BuildError {
    pub(crate) fn new(err: &DiagnosticError, sources: &SourceRegistry) -> Self {
        BuildError {
            rendered: err.render(sources),
        }
    }
    pub fn message(&self) -> &str {
        &self.rendered
    }
}

impl Display for BuildError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        f.write_str(self.rendered.trim_end())
    }
}

impl std::error::Error for BuildError {}
