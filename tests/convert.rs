use std::fs;
use std::path::{Path, PathBuf};

use rsp2h::writer::Dataset;
use rsp2h::CavpError;
use tempfile::TempDir;

fn rsp(mode_line: &str, keylen: u32, keys: &[&str]) -> String {
	let mut s = format!(
		"# CAVS 14.0\n{}\n\n[Keylen = {}]\n[IVlen = 96]\n[PTlen = 0]\n[AADlen = 0]\n[Taglen = 128]\n\n",
		mode_line, keylen
	);
	for (i, key) in keys.iter().enumerate() {
		s += &format!(
			"Count = {}\nKey = {}\nIV = 000000000000000000000000\nPT = \nAAD = \nCT = \nTag = 00000000000000000000000000000000\n\n",
			i, key
		);
	}
	s
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
	let path = dir.join(name);
	fs::write(&path, content).unwrap();
	path
}

fn rows(header: &str) -> Vec<&str> {
	header.lines().filter(|l| l.starts_with("    {")).collect()
}

#[test]
fn files_are_emitted_in_listed_order() {
	let dir = TempDir::new().unwrap();
	let a = write(dir.path(), "a.rsp", &rsp("# GCM Encrypt with keysize 128", 128, &["aa000000", "aa000001"]));
	let b = write(dir.path(), "b.rsp", &rsp("# GCM Encrypt with keysize 256", 256, &["bb000000"]));
	let out = dir.path().join("gcm.h");

	let mut data = Dataset::default();
	data.load(&b).unwrap();
	data.load(&a).unwrap();
	assert_eq!(data.block_count(), 3);

	let n = data.write_to_path(&out, &["b.rsp", "a.rsp"]).unwrap();
	assert_eq!(n, 3);

	let header = fs::read_to_string(&out).unwrap();
	assert!(header.contains(" *     b.rsp\n *     a.rsp\n"));
	let rows = rows(&header);
	assert_eq!(rows.len(), 3);
	assert!(rows[0].starts_with("    {{0x000000bb}, 256,"));
	assert!(rows[1].starts_with("    {{0x000000aa}, 128,"));
	assert!(rows[2].starts_with("    {{0x010000aa}, 128,"));
}

#[test]
fn last_mode_names_the_guard() {
	let dir = TempDir::new().unwrap();
	let a = write(dir.path(), "a.rsp", &rsp("# GCM Encrypt", 128, &["00"]));
	let b = write(dir.path(), "b.rsp", &rsp("# xpn Encrypt", 128, &["00"]));
	let out = dir.path().join("out.h");

	let mut data = Dataset::default();
	data.load(&a).unwrap();
	data.load(&b).unwrap();
	data.write_to_path(&out, &["a.rsp", "b.rsp"]).unwrap();

	let header = fs::read_to_string(&out).unwrap();
	assert!(header.contains("#ifndef AES_XPN_CAVP_H\n"));
	assert!(header.contains("const xpn_data NIST_XPN_DATA[] = {\n"));
	assert_eq!(rows(&header).len(), 2);
}

#[test]
fn missing_input_is_io_error() {
	let dir = TempDir::new().unwrap();
	let mut data = Dataset::default();
	let err = data.load(dir.path().join("absent.rsp")).unwrap_err();
	assert!(matches!(err, CavpError::Io(_)));
}

#[test]
fn block_without_length_fails() {
	let dir = TempDir::new().unwrap();
	let content = "# CAVS 14.0
# GCM Encrypt
[Keylen = 128]
[IVlen = 96]
[Taglen = 128]

Count = 0
Key = 00112233
IV = 00112233
PT = 00112233
Tag = 00112233
";
	let input = write(dir.path(), "bad.rsp", content);

	let mut data = Dataset::default();
	data.load(&input).unwrap();
	let err = data.write_header(Vec::new(), &["bad.rsp"]).unwrap_err();
	assert!(matches!(err, CavpError::MissingHeaderField(ref f) if f == "PTlen"));
}

#[test]
fn count_is_not_formatted() {
	let dir = TempDir::new().unwrap();
	let input = write(dir.path(), "a.rsp", &rsp("# GCM Encrypt", 128, &["00", "00", "00"]));

	let mut data = Dataset::default();
	data.load(&input).unwrap();
	let counts: Vec<_> = data.sections[0]
		.blocks
		.iter()
		.map(|b| b.get("Count").unwrap())
		.collect();
	assert_eq!(counts, ["0", "1", "2"]);
}
