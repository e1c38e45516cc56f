//! Minimal CSV record reader.
//!
//! Supports RFC 4180 quoting: quoted fields may contain commas, newlines and
//! doubled quotes. Records whose fields are all blank are dropped.

use crate::error::ParseError;

/// A single CSV record and the line it starts on (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Record {
  pub line: usize,
  pub fields: Vec<String>,
}

pub(crate) fn read_records(source: &str) -> Result<Vec<Record>, ParseError> {
  let source = source.strip_prefix('\u{feff}').unwrap_or(source);

  let mut records = Vec::new();
  let mut fields = Vec::new();
  let mut field = String::new();
  let mut in_quotes = false;
  let mut quoted = false;
  let mut line = 1;
  let mut record_line = 1;
  let mut chars = source.chars().peekable();

  while let Some(c) = chars.next() {
    if in_quotes {
      match c {
        '"' if chars.peek() == Some(&'"') => {
          chars.next();
          field.push('"');
        }
        '"' => in_quotes = false,
        '\n' => {
          line += 1;
          field.push('\n');
        }
        _ => field.push(c),
      }
      continue;
    }

    match c {
      '"' if field.is_empty() && !quoted => {
        in_quotes = true;
        quoted = true;
      }
      ',' => {
        fields.push(std::mem::take(&mut field));
        quoted = false;
      }
      '\r' if chars.peek() == Some(&'\n') => {}
      '\n' | '\r' => {
        fields.push(std::mem::take(&mut field));
        quoted = false;
        push_record(&mut records, record_line, std::mem::take(&mut fields));
        line += 1;
        record_line = line;
      }
      _ => field.push(c),
    }
  }

  if in_quotes {
    return Err(ParseError::UnterminatedQuote { line: record_line });
  }

  if !field.is_empty() || !fields.is_empty() {
    fields.push(field);
    push_record(&mut records, record_line, fields);
  }

  Ok(records)
}

fn push_record(records: &mut Vec<Record>, line: usize, fields: Vec<String>) {
  if fields.iter().any(|f| !f.trim().is_empty()) {
    records.push(Record { line, fields });
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn fields(source: &str) -> Vec<Vec<String>> {
    read_records(source)
      .unwrap()
      .into_iter()
      .map(|r| r.fields)
      .collect()
  }

  #[test]
  fn test_plain_records() {
    assert_eq!(
      fields("a,b,c\n1,2,3\n"),
      vec![vec!["a", "b", "c"], vec!["1", "2", "3"]]
    );
  }

  #[test]
  fn test_quoted_comma_and_escaped_quote() {
    assert_eq!(
      fields("a,\"hello, \"\"world\"\"\",c"),
      vec![vec!["a", "hello, \"world\"", "c"]]
    );
  }

  #[test]
  fn test_quoted_newline_keeps_record_line() {
    let records = read_records("h1,h2\n\"multi\nline\",x\nnext,y").unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(records[1].fields, vec!["multi\nline", "x"]);
    assert_eq!(records[1].line, 2);
    assert_eq!(records[2].line, 4);
  }

  #[test]
  fn test_crlf_and_blank_lines() {
    let records = read_records("a,b\r\n\r\n,\r\n1,2\r\n").unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[1].fields, vec!["1", "2"]);
    assert_eq!(records[1].line, 4);
  }

  #[test]
  fn test_trailing_empty_field() {
    assert_eq!(fields("a,b,\n"), vec![vec!["a", "b", ""]]);
  }

  #[test]
  fn test_unterminated_quote() {
    let result = read_records("a,b\n\"open,c\n");
    assert!(matches!(result, Err(ParseError::UnterminatedQuote { line: 2 })));
  }

  #[test]
  fn test_byte_order_mark_is_ignored() {
    assert_eq!(fields("\u{feff}a,b"), vec![vec!["a", "b"]]);
  }
}
