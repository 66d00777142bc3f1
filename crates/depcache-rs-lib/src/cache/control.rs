//! Reader for deb822 control files (`status`, `Packages`, `extended_states`, pin files).

/// One paragraph of a control file.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Stanza {
	fields: Vec<(String, String)>,
	/// Line the paragraph starts on, 1 based.
	line: usize,
}

impl Stanza {
	/// Field lookup, names are case insensitive.
	pub fn get(&self, name: &str) -> Option<&str> {
		self.fields.iter()
			.find(|(k, _)| k.eq_ignore_ascii_case(name))
			.map(|(_, v)| v.as_str())
	}

	pub fn line(&self) -> usize {
		self.line
	}

	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}
}

/// Splits `text` into paragraphs.
///
/// # Errors
/// - [`Parse`](crate::Error::Parse) on a line that is neither a field, a continuation nor a comment.
pub fn parse_stanzas(text: &str) -> crate::Result<Vec<Stanza>> {
	let mut out = Vec::new();
	let mut current = Stanza::default();

	for (i, line) in text.lines().enumerate() {
		let line_no = i + 1;

		if line.trim().is_empty() {
			if !current.is_empty() {
				out.push(std::mem::take(&mut current));
			}
			continue;
		}

		if line.starts_with('#') {
			continue;
		}

		if line.starts_with(' ') || line.starts_with('\t') {
			let Some((_, value)) = current.fields.last_mut() else {
				return Err(crate::Error::Parse(format!("line {}: continuation line without a field", line_no)));
			};
			let cont = line.trim();
			value.push('\n');
			if cont != "." {
				value.push_str(cont);
			}
			continue;
		}

		let (name, value) = line.split_once(':')
			.ok_or_else(|| crate::Error::Parse(format!("line {}: expected \"Field: value\"", line_no)))?;
		if current.is_empty() {
			current.line = line_no;
		}
		current.fields.push((name.trim().to_string(), value.trim().to_string()));
	}

	if !current.is_empty() {
		out.push(current);
	}
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn paragraphs_and_continuations() {
		let text = "Package: foo\nDescription: short\n long line\n .\n more\n\n# comment\n\n\npackage: bar\n";
		let s = parse_stanzas(text).unwrap();
		assert_eq!(s.len(), 2);
		assert_eq!(s[0].get("description"), Some("short\nlong line\n\nmore"));
		assert_eq!(s[1].get("Package"), Some("bar"));
		assert_eq!(s[1].line(), 10);
	}

	#[test]
	fn garbage_line_is_error() {
		assert!(parse_stanzas("Package: foo\nnot a field\n").is_err());
	}

	#[test]
	fn leading_continuation_is_error() {
		assert!(parse_stanzas(" orphan\n").is_err());
	}
}
