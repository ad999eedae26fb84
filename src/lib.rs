//! Converts NIST CAVP response files (`.rsp`) for AES-GCM into a C header
//! holding a static table of test vectors.
//!
//! The pipeline is [`reader::RspReader`] (text to sections of header and
//! blocks), [`words`] (hex to byte-swapped 32-bit words) and
//! [`writer::Dataset`] (sections from all inputs to one header file).

use thiserror::Error;

/// Everything that can stop a conversion. None of these are recoverable.
#[derive(Debug, Error)]
pub enum CavpError {
	#[error("I/O error")]
	Io(#[from] std::io::Error),

	/// The second line has no second space-separated token.
	#[error("Mode not found: second line must look like '# <MODE> ...'")]
	MissingMode,

	#[error("Header not found: {line} (line {line_no})")]
	HeaderNotFound { line_no: usize, line: String },

	#[error("Invalid header block line: {line} (line {line_no})")]
	InvalidHeaderLine { line_no: usize, line: String },

	#[error("Unexpected line: {line} (line {line_no})")]
	UnexpectedLine { line_no: usize, line: String },

	#[error("Invalid hex in {field}: {value}")]
	InvalidHex {
		field: String,
		value: String,
		#[source]
		source: hex::FromHexError,
	},

	/// A block refers to a length the governing header does not declare.
	#[error("Header field not found: {0}")]
	MissingHeaderField(String),

	#[error("Block field not found: {0}")]
	MissingBlockField(String),
}

pub type Result<T> = std::result::Result<T, CavpError>;

// Converts txt to u32
fn to_uint(s: &str) -> Option<u32> {
	s.parse().ok()
}

// Splits "KEY = VALUE" into trimmed halves. More than one '=' is an error.
fn split_pair(s: &str) -> Option<(&str, &str)> {
	let mut it = s.split('=');
	match (it.next(), it.next(), it.next()) {
		(Some(k), Some(v), None) => Some((k.trim(), v.trim())),
		_ => None,
	}
}

pub mod reader {
	use std::collections::BTreeMap;
	use std::io::{BufRead, BufReader};
	use tracing::{debug, trace};
	use super::{CavpError, Result};

	/// Bit lengths declared by the `[KEY = NUM]` lines in front of a run of blocks.
	#[derive(Debug, Default, Clone, PartialEq, Eq)]
	pub struct Header {
		fields: BTreeMap<String, u32>,
	}

	impl Header {
		pub fn get(&self, k: &str) -> Option<u32> {
			self.fields.get(k).copied()
		}

		/// Like `get`, but a missing key is a `MissingHeaderField` error.
		pub fn require(&self, k: &str) -> Result<u32> {
			self.get(k).ok_or_else(|| CavpError::MissingHeaderField(k.to_string()))
		}

		pub fn len(&self) -> usize {
			self.fields.len()
		}

		pub fn is_empty(&self) -> bool {
			self.fields.is_empty()
		}
	}

	impl<K: Into<String>> FromIterator<(K, u32)> for Header {
		fn from_iter<I: IntoIterator<Item = (K, u32)>>(iter: I) -> Self {
			Header { fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect() }
		}
	}

	/// One test vector: field name to raw value, as read from the file.
	#[derive(Debug, Default, Clone, PartialEq, Eq)]
	pub struct Block {
		fields: BTreeMap<String, String>,
	}

	impl Block {
		pub fn get(&self, k: &str) -> Option<&str> {
			self.fields.get(k).map(String::as_str)
		}

		pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
			self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
		}

		pub fn len(&self) -> usize {
			self.fields.len()
		}

		pub fn is_empty(&self) -> bool {
			self.fields.is_empty()
		}
	}

	impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Block {
		fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
			Block { fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
		}
	}

	/// A header and the blocks it governs.
	#[derive(Debug, Default, Clone, PartialEq, Eq)]
	pub struct Section {
		pub header: Header,
		pub blocks: Vec<Block>,
	}

	/// A parsed response file.
	#[derive(Debug, Default, Clone, PartialEq, Eq)]
	pub struct RspDocument {
		pub mode: String,
		pub sections: Vec<Section>,
	}

	impl RspDocument {
		pub fn block_count(&self) -> usize {
			self.sections.iter().map(|s| s.blocks.len()).sum()
		}
	}

	pub struct RspReader<R: std::io::Read> {
		reader: BufReader<R>,
	}

	impl<R: std::io::Read> RspReader<R> {
		pub fn new(r: BufReader<R>) -> RspReader<R> {
			RspReader { reader: r }
		}

		/// Reads the whole input and parses it.
		pub fn parse(self) -> Result<RspDocument> {
			let lines = self.reader
				.lines()
				.map(|l| l.map(|l| l.trim().to_string()))
				.collect::<std::io::Result<Vec<_>>>()?;
			parse_lines(lines)
		}
	}

	pub fn parse_str(s: &str) -> Result<RspDocument> {
		parse_lines(s.lines().map(|l| l.trim().to_string()).collect())
	}

	// Trimmed input lines and a cursor into them.
	struct Lines {
		lines: Vec<String>,
		pos: usize,
	}

	impl Lines {
		fn peek(&self) -> Option<&str> {
			self.lines.get(self.pos).map(String::as_str)
		}

		// Returns the current line with its 1-based number and moves past it.
		fn next_line(&mut self) -> Option<(usize, &str)> {
			let line = self.lines.get(self.pos)?;
			self.pos += 1;
			Some((self.pos, line.as_str()))
		}

		fn skip(&mut self) {
			self.pos += 1;
		}

		fn line_no(&self) -> usize {
			self.pos + 1
		}
	}

	// Line 2 is expected to look like "# GCM Encrypt with keysize 128 ...".
	fn detect_mode(lines: &[String]) -> Result<String> {
		lines.get(1)
			.and_then(|l| l.split(' ').nth(1))
			.map(str::to_string)
			.ok_or(CavpError::MissingMode)
	}

	fn parse_lines(lines: Vec<String>) -> Result<RspDocument> {
		let mode = detect_mode(&lines)?;
		let mut lines = Lines { lines, pos: 0 };
		let mut sections = Vec::new();

		while let Some(line) = lines.peek() {
			if line.is_empty() || line.starts_with('#') {
				lines.skip();
				continue;
			}
			if !line.starts_with('[') {
				return Err(CavpError::HeaderNotFound {
					line_no: lines.line_no(),
					line: line.to_string(),
				});
			}

			let header = read_header(&mut lines)?;
			let blocks = read_blocks(&mut lines)?;
			debug!(fields = header.len(), blocks = blocks.len(), "parsed section");
			sections.push(Section { header, blocks });
		}

		Ok(RspDocument { mode, sections })
	}

	// Reads "[KEY = NUM]" lines up to and including the first blank line.
	fn read_header(lines: &mut Lines) -> Result<Header> {
		let mut header = Header::default();
		while let Some((line_no, line)) = lines.next_line() {
			if line.is_empty() {
				break;
			}
			let invalid = || CavpError::InvalidHeaderLine { line_no, line: line.to_string() };
			if !line.starts_with('[') {
				return Err(invalid());
			}
			let (k, v) = super::split_pair(line.trim_matches(|c: char| c == '[' || c == ']'))
				.ok_or_else(invalid)?;
			let v = super::to_uint(v).ok_or_else(invalid)?;
			header.fields.insert(k.to_string(), v);
		}
		Ok(header)
	}

	// Reads blocks until the next header, a comment or the end of input.
	fn read_blocks(lines: &mut Lines) -> Result<Vec<Block>> {
		let mut blocks = Vec::new();
		while let Some(line) = lines.peek() {
			if line.is_empty() {
				lines.skip();
				continue;
			}
			if line.starts_with('[') || line.starts_with('#') {
				break;
			}
			blocks.push(read_block(lines)?);
		}
		Ok(blocks)
	}

	// Reads "KEY = VALUE" lines up to and including the first blank line.
	fn read_block(lines: &mut Lines) -> Result<Block> {
		let mut block = Block::default();
		while let Some((line_no, line)) = lines.next_line() {
			if line.is_empty() {
				break;
			}
			let (k, v) = super::split_pair(line)
				.ok_or_else(|| CavpError::UnexpectedLine { line_no, line: line.to_string() })?;
			block.fields.insert(k.to_string(), v.to_string());
		}
		trace!(count = ?block.get("Count"), fields = block.len(), "parsed block");
		Ok(block)
	}
}

pub mod words {
	use std::collections::BTreeMap;
	use std::fmt;
	use hex::FromHex;
	use super::reader::Block;
	use super::{CavpError, Result};

	/// Hex digits per 32-bit word.
	pub const WORD_DIGITS: usize = 8;

	/// Decimal test index, emitted verbatim.
	pub const COUNT: &str = "Count";

	/// Renders as `{}`.
	pub const EMPTY: WordArray = WordArray(Vec::new());

	/// Byte-swapped words, rendered as a C array literal.
	#[derive(Debug, Default, Clone, PartialEq, Eq)]
	pub struct WordArray(Vec<String>);

	impl WordArray {
		pub fn words(&self) -> &[String] {
			&self.0
		}

	}

	impl fmt::Display for WordArray {
		fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			write!(f, "{{")?;
			for (i, w) in self.0.iter().enumerate() {
				if i > 0 {
					write!(f, ", ")?;
				}
				write!(f, "0x{}", w)?;
			}
			write!(f, "}}")
		}
	}

	/// Splits a hex string into 8-digit words. The last word is padded on the
	/// right with '0', so "ABC" becomes "ABC00000".
	pub fn words32(v: &str) -> Vec<String> {
		let digits: Vec<char> = v.chars().collect();
		digits
			.chunks(WORD_DIGITS)
			.map(|w| format!("{:0<8}", w.iter().collect::<String>()))
			.collect()
	}

	/// Reverses the bytes of one 8-digit word. Digits inside a byte keep their
	/// order and case: "00112233" becomes "33221100".
	///
	/// The word must be valid hex. Other characters are an error here, not
	/// swapped through as text.
	pub fn bswap32(w: &str) -> std::result::Result<String, hex::FromHexError> {
		<[u8; 4]>::from_hex(w)?;
		let digits: Vec<char> = w.chars().collect();
		Ok(digits.chunks(2).rev().flatten().collect())
	}

	/// Pads, then swaps, every word of `v`.
	pub fn format_words(field: &str, v: &str) -> Result<WordArray> {
		words32(v)
			.iter()
			.map(|w| {
				bswap32(w).map_err(|source| CavpError::InvalidHex {
					field: field.to_string(),
					value: v.to_string(),
					source,
				})
			})
			.collect::<Result<Vec<_>>>()
			.map(WordArray)
	}

	/// A block with its hex fields turned into words. Fields with empty
	/// values are left out.
	#[derive(Debug, Default, Clone, PartialEq, Eq)]
	pub struct FormattedBlock {
		pub count: Option<String>,
		pub fields: BTreeMap<String, WordArray>,
	}

	impl FormattedBlock {
		pub fn get(&self, k: &str) -> Option<&WordArray> {
			self.fields.get(k)
		}

		pub fn require(&self, k: &str) -> Result<&WordArray> {
			self.get(k).ok_or_else(|| CavpError::MissingBlockField(k.to_string()))
		}
	}

	pub fn format_block(block: &Block) -> Result<FormattedBlock> {
		let mut out = FormattedBlock::default();
		for (k, v) in block.iter() {
			if k == COUNT {
				out.count = Some(v.to_string());
				continue;
			}
			if v.is_empty() {
				continue;
			}
			out.fields.insert(k.to_string(), format_words(k, v)?);
		}
		Ok(out)
	}
}

pub mod writer {
	use std::fmt;
	use std::fs::File;
	use std::io::{BufReader, BufWriter, Write};
	use std::path::Path;
	use tracing::{debug, info};
	use super::reader::{Header, RspDocument, RspReader, Section};
	use super::words::{format_block, FormattedBlock, WordArray, EMPTY};
	use super::Result;

	const RECORD_FIELDS: &str = concat!(
		"\n",
		"typedef struct {\n",
		"    uint32_t key[8];\n",
		"    uint32_t key_len;\n",
		"    uint32_t IV[128];\n",
		"    uint32_t IV_len;\n",
		"    uint32_t PT[64];\n",
		"    uint32_t PT_len;\n",
		"    uint32_t CT[64];\n",
		"    uint32_t AAD[96];\n",
		"    uint32_t AAD_len;\n",
		"    uint32_t tag[16];\n",
		"    uint32_t tag_len;\n",
	);

	/// One row of the output table.
	#[derive(Debug, Clone, PartialEq, Eq)]
	pub struct GcmVector {
		pub count: Option<String>,
		pub key: WordArray,
		pub key_len: u32,
		pub iv: WordArray,
		pub iv_len: u32,
		pub pt: Option<WordArray>,
		pub pt_len: u32,
		pub ct: Option<WordArray>,
		pub aad: Option<WordArray>,
		pub aad_len: u32,
		pub tag: WordArray,
		pub tag_len: u32,
	}

	impl GcmVector {
		/// Pairs a formatted block with the lengths its header declares.
		/// `PT` and `AAD` lengths are only looked up when the field is present.
		pub fn from_block(header: &Header, block: &FormattedBlock) -> Result<GcmVector> {
			let aad = block.get("AAD").cloned();
			let aad_len = if aad.is_some() { header.require("AADlen")? } else { 0 };
			let pt = block.get("PT").cloned();
			let pt_len = if pt.is_some() { header.require("PTlen")? } else { 0 };

			Ok(GcmVector {
				count: block.count.clone(),
				key: block.require("Key")?.clone(),
				key_len: header.require("Keylen")?,
				iv: block.require("IV")?.clone(),
				iv_len: header.require("IVlen")?,
				pt,
				pt_len,
				ct: block.get("CT").cloned(),
				aad,
				aad_len,
				tag: block.require("Tag")?.clone(),
				tag_len: header.require("Taglen")?,
			})
		}
	}

	impl fmt::Display for GcmVector {
		fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			write!(
				f,
				"{}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}",
				self.key,
				self.key_len,
				self.iv,
				self.iv_len,
				self.pt.as_ref().unwrap_or(&EMPTY),
				self.pt_len,
				self.ct.as_ref().unwrap_or(&EMPTY),
				self.aad.as_ref().unwrap_or(&EMPTY),
				self.aad_len,
				self.tag,
				self.tag_len,
			)
		}
	}

	/// Writes the header file piece by piece, straight to `out`.
	pub struct HeaderWriter<W: Write> {
		out: W,
		mode_upper: String,
		mode_lower: String,
		rows: usize,
	}

	impl<W: Write> HeaderWriter<W> {
		pub fn new(out: W, mode: &str) -> HeaderWriter<W> {
			HeaderWriter {
				out,
				mode_upper: mode.to_uppercase(),
				mode_lower: mode.to_lowercase(),
				rows: 0,
			}
		}

		/// Banner, include guard, record type and the opening of the table.
		pub fn write_preamble<S: AsRef<str>>(&mut self, input_files: &[S]) -> Result<()> {
			write!(self.out, "/*\n * Auto generated by rsp2h from input files:\n")?;
			for name in input_files {
				writeln!(self.out, " *     {}", name.as_ref())?;
			}
			writeln!(self.out, " */")?;
			writeln!(self.out, "#ifndef AES_{}_CAVP_H", self.mode_upper)?;
			writeln!(self.out, "#define AES_{}_CAVP_H", self.mode_upper)?;
			write!(self.out, "{}}} {}_data;\n\n", RECORD_FIELDS, self.mode_lower)?;
			writeln!(self.out, "const {}_data NIST_{}_DATA[] = {{", self.mode_lower, self.mode_upper)?;
			Ok(())
		}

		pub fn write_vector(&mut self, v: &GcmVector) -> Result<()> {
			writeln!(self.out, "    {{{}}},", v)?;
			self.rows += 1;
			Ok(())
		}

		/// Closes the table and the include guard. Returns the number of rows.
		pub fn finish(mut self) -> Result<usize> {
			write!(self.out, "}};\n\n")?;
			writeln!(self.out, "#endif /* ! AES_TESTS_{}_DATA_H */", self.mode_upper)?;
			self.out.flush()?;
			Ok(self.rows)
		}
	}

	/// Sections from every input of one run, in the order the files were loaded.
	#[derive(Debug, Default, Clone)]
	pub struct Dataset {
		/// Mode of the last loaded file.
		pub mode: String,
		pub sections: Vec<Section>,
	}

	impl Dataset {
		pub fn append(&mut self, doc: RspDocument) {
			self.mode = doc.mode;
			self.sections.extend(doc.sections);
		}

		/// Parses one response file and appends its sections.
		pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
			let path = path.as_ref();
			let f = File::open(path)?;
			let doc = RspReader::new(BufReader::new(f)).parse()?;
			debug!(
				path = %path.display(),
				mode = %doc.mode,
				sections = doc.sections.len(),
				vectors = doc.block_count(),
				"loaded response file"
			);
			self.append(doc);
			Ok(())
		}

		pub fn block_count(&self) -> usize {
			self.sections.iter().map(|s| s.blocks.len()).sum()
		}

		/// Emits the whole header to `out`, one row per block. Returns the
		/// number of rows written.
		pub fn write_header<W: Write, S: AsRef<str>>(&self, out: W, input_files: &[S]) -> Result<usize> {
			let mut w = HeaderWriter::new(out, &self.mode);
			w.write_preamble(input_files)?;
			for section in &self.sections {
				for block in &section.blocks {
					let v = GcmVector::from_block(&section.header, &format_block(block)?)?;
					w.write_vector(&v)?;
				}
			}
			w.finish()
		}

		pub fn write_to_path<P: AsRef<Path>, S: AsRef<str>>(&self, path: P, input_files: &[S]) -> Result<usize> {
			let path = path.as_ref();
			let out = BufWriter::new(File::create(path)?);
			let rows = self.write_header(out, input_files)?;
			info!(path = %path.display(), rows, mode = %self.mode, "wrote header");
			Ok(rows)
		}
	}
}
