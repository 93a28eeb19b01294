//! Turtle reading via Sophia.
//!
//! Sophia hands us terms; we go through their N-Triples display form so the
//! rest of the crate only deals with [`doc::Term`].

use crate::document as doc;
use crate::RdfError;
use sophia::api::prelude::*;

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
struct RdfSinkError {
    message: String,
}

impl From<RdfError> for RdfSinkError {
    fn from(value: RdfError) -> Self {
        Self {
            message: value.to_string(),
        }
    }
}

fn unescape_rdf_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Parse the display form of a term: `<iri>`, `_:id`, `"lex"`, `"lex"@lang`,
/// `"lex"^^<dt>`.
pub(crate) fn parse_term_display(term: &str) -> Result<doc::Term, RdfError> {
    let s = term.trim();

    if let Some(iri) = s.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
        return Ok(doc::Term::Iri(iri.to_string()));
    }
    if let Some(id) = s.strip_prefix("_:") {
        return Ok(doc::Term::Blank(id.to_string()));
    }
    if !s.starts_with('"') {
        return Err(RdfError::Term(s.to_string()));
    }

    let mut end_quote = None;
    let mut escaped = false;
    for (i, ch) in s.char_indices().skip(1) {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => {
                end_quote = Some(i);
                break;
            }
            _ => {}
        }
    }
    let end = end_quote.ok_or_else(|| RdfError::Term(s.to_string()))?;
    let lexical = unescape_rdf_string(&s[1..end]);
    let rest = s[end + 1..].trim();

    let mut literal = doc::Literal::plain(&lexical);
    if let Some(lang) = rest.strip_prefix('@') {
        literal.language = Some(lang.to_string());
    } else if let Some(dt) = rest.strip_prefix("^^") {
        let dt = dt.trim();
        let dt = dt
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .unwrap_or(dt);
        if !dt.is_empty() && dt != "http://www.w3.org/2001/XMLSchema#string" {
            literal.datatype = Some(dt.to_string());
        }
    }
    Ok(doc::Term::Literal(literal))
}

/// All triples of a Turtle document. Blank-node subjects keep their `_:` form.
pub(crate) fn parse_turtle(turtle: &str) -> Result<Vec<doc::Triple>, RdfError> {
    let cursor = std::io::Cursor::new(turtle.as_bytes());
    let reader = std::io::BufReader::new(cursor);

    let mut out: Vec<doc::Triple> = Vec::new();
    let mut parser = sophia::turtle::parser::turtle::parse_bufread(reader);
    parser
        .try_for_each_triple(|t| -> std::result::Result<(), RdfSinkError> {
            let subject = match parse_term_display(&t.s().to_string())? {
                doc::Term::Iri(iri) => iri,
                doc::Term::Blank(id) => format!("_:{id}"),
                doc::Term::Literal(_) => return Ok(()),
            };
            let doc::Term::Iri(predicate) = parse_term_display(&t.p().to_string())? else {
                return Ok(());
            };
            let object = parse_term_display(&t.o().to_string())?;
            out.push(doc::Triple {
                subject,
                predicate,
                object,
            });
            Ok(())
        })
        .map_err(|e| RdfError::Parse(e.to_string()))?;
    Ok(out)
}
