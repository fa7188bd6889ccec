use std::path::Path;

use swc_core::common::comments::SingleThreadedComments;
use swc_core::common::sync::Lrc;
use swc_core::common::{BytePos, FileName, SourceMap, Span, Spanned};
use swc_core::ecma::ast::{EsVersion, Module};
use swc_core::ecma::codegen::text_writer::JsWriter;
use swc_core::ecma::codegen::{Config as CodegenConfig, Emitter};
use swc_core::ecma::parser::{Parser, StringInput, Syntax, TsSyntax};

use crate::error::Error;

/// Extensions whose files must not be parsed with JSX enabled: in plain
/// TypeScript `<T>expr` is a type assertion, not an element.
const NON_JSX_EXTENSIONS: &[&str] = &["ts", "mts", "cts"];

/// How to parse a source text.
///
/// Type annotations, decorators, class fields, optional chaining and
/// nullish coalescing are always on; JSX depends on the file kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Shown in parse errors and used to derive default-export names.
    pub file_name: Option<String>,
    pub jsx: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            file_name: None,
            jsx: true,
        }
    }
}

impl ParseOptions {
    /// Options inferred from a file path.
    pub fn for_path(path: &Path) -> Self {
        let jsx = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_none_or(|ext| !NON_JSX_EXTENSIONS.contains(&ext.to_lowercase().as_str()));
        Self {
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            jsx,
        }
    }

    /// File name without its extension, if a file name is known.
    pub fn file_stem(&self) -> Option<&str> {
        let name = self.file_name.as_deref()?;
        let stem = Path::new(name).file_stem()?.to_str()?;
        (!stem.is_empty()).then_some(stem)
    }

    fn syntax(&self) -> Syntax {
        Syntax::Typescript(TsSyntax {
            tsx: self.jsx,
            decorators: true,
            ..Default::default()
        })
    }
}

/// A parsed module together with the source map and comments needed to
/// report lines and print it back.
pub struct SyntaxTree {
    pub module: Module,
    source_map: Lrc<SourceMap>,
    comments: SingleThreadedComments,
}

impl SyntaxTree {
    pub fn parse(source: &str, options: &ParseOptions) -> Result<Self, Error> {
        let source_map: Lrc<SourceMap> = Default::default();
        let file_name = options
            .file_name
            .clone()
            .unwrap_or_else(|| "<input>".to_string());
        let file = source_map.new_source_file(
            Lrc::new(FileName::Custom(file_name.clone())),
            source.to_string(),
        );
        let comments = SingleThreadedComments::default();

        let (parsed, recovered) = {
            let mut parser = Parser::new(options.syntax(), StringInput::from(&*file), Some(&comments));
            let parsed = parser.parse_module();
            (parsed, parser.take_errors())
        };

        let to_error = |err: swc_core::ecma::parser::error::Error| {
            let span = err.span();
            let line = if span.is_dummy() {
                0
            } else {
                source_map.lookup_char_pos(span.lo).line
            };
            Error::Parse {
                file: file_name.clone(),
                line,
                message: err.kind().msg().into_owned(),
            }
        };

        let module = parsed.map_err(to_error)?;
        // Recoverable errors still mean the text is not valid in this dialect.
        if let Some(err) = recovered.into_iter().next() {
            return Err(to_error(err));
        }

        Ok(Self {
            module,
            source_map,
            comments,
        })
    }

    /// 1-based first and last line covered by `span`.
    pub fn line_span(&self, span: Span) -> (usize, usize) {
        let start = self.source_map.lookup_char_pos(span.lo).line;
        let last = BytePos(span.hi.0.saturating_sub(1)).max(span.lo);
        let end = self.source_map.lookup_char_pos(last).line;
        (start, end)
    }

    pub fn print(&self) -> Result<String, Error> {
        let mut buf = Vec::new();
        {
            let mut emitter = Emitter {
                cfg: CodegenConfig::default().with_target(EsVersion::EsNext),
                cm: self.source_map.clone(),
                comments: Some(&self.comments),
                wr: JsWriter::new(self.source_map.clone(), "\n", &mut buf, None),
            };
            emitter
                .emit_module(&self.module)
                .map_err(|e| Error::Print(e.to_string()))?;
        }
        String::from_utf8(buf).map_err(|e| Error::Print(e.to_string()))
    }
}
