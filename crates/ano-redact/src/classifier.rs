//! Text/binary classification by file name and content sniffing

use std::collections::HashSet;

/// Bytes inspected when sniffing content
const SNIFF_LEN: usize = 8192;

/// Share of control bytes above which a sample is considered binary
const MAX_CONTROL_RATIO: f64 = 0.1;

const TEXT_EXTENSIONS: &[&str] = &[
    "ada", "adb", "ads", "applescript", "as", "asc", "ascii", "ascx", "asm", "asmx", "asp",
    "aspx", "atom", "bas", "bash", "bashrc", "bat", "bbcolors", "bib", "bowerrc", "c", "cbl",
    "cc", "cfc", "cfg", "cfm", "cjs", "clj", "cljs", "cls", "cmake", "cmd", "cnf", "cob", "coffee",
    "conf", "cpp", "cs", "cshtml", "csproj", "css", "csv", "cts", "cxx", "d", "dart", "diff",
    "dtd", "editorconfig", "el", "elm", "env", "erb", "erl", "ex", "exs", "f", "f77", "f90",
    "fish", "for", "fs", "fsi", "fsx", "gemspec", "gitattributes", "gitignore", "gitkeep",
    "gitmodules", "go", "gradle", "graphql", "groovy", "h", "haml", "handlebars", "hbs", "hh",
    "hpp", "hrl", "hs", "htm", "html", "hxx", "ini", "java", "jl", "js", "json", "json5",
    "jsonc", "jsx", "kt", "kts", "latex", "less", "lhs", "lisp", "log", "lua", "m", "make",
    "makefile", "markdown", "md", "mdx", "mjs", "ml", "mli", "mm", "mts", "nim", "nix",
    "npmignore", "pas", "patch", "php", "pl", "pm", "pod", "properties", "proto", "ps1", "psd1",
    "psm1", "pug", "py", "pyi", "pyx", "r", "rake", "rb", "rdoc", "readme", "rest", "rmd", "rs",
    "rst", "rtf", "sass", "scala", "scm", "scss", "sh", "sql", "styl", "sv", "svelte", "svg",
    "swift", "t", "tex", "tf", "toml", "ts", "tsv", "tsx", "twig", "txt", "v", "vb", "vbs",
    "vhd", "vhdl", "vim", "vue", "xaml", "xht", "xhtml", "xml", "xsd", "xsl", "xslt", "yaml",
    "yml", "zsh",
];

const BINARY_EXTENSIONS: &[&str] = &[
    "7z", "a", "aac", "ai", "aif", "aiff", "apk", "ar", "avi", "avif", "bin", "bmp", "bz2",
    "cab", "class", "dat", "db", "deb", "dll", "dmg", "doc", "docx", "dylib", "egg", "eot", "epub",
    "exe", "flac", "flv", "gif", "gz", "h5", "icns", "ico", "iso", "jar", "jpeg", "jpg", "lz",
    "lzma", "m4a", "m4v", "mkv", "mov", "mp3", "mp4", "mpeg", "mpg", "msi", "npy", "npz", "o",
    "obj", "odp", "ods", "odt", "ogg", "otf", "pdf", "pickle", "pkl", "png", "ppt", "pptx",
    "psd", "pyc", "pyo", "rar", "rpm", "so", "sqlite", "swf", "tar", "tgz", "tif", "tiff",
    "ttf", "wasm", "wav", "webm", "webp", "whl", "wma", "wmv", "woff", "woff2", "xls", "xlsx",
    "xz", "zip", "zst",
];

/// Three-valued classification; `Unknown` is only ever a name-based answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Unknown,
    Text,
    Binary,
}

impl Classification {
    pub fn is_text(self) -> bool {
        self == Classification::Text
    }

    pub fn is_binary(self) -> bool {
        self == Classification::Binary
    }

    pub fn is_known(self) -> bool {
        self != Classification::Unknown
    }
}

/// Classifies files by extension, then by content when the name is not
/// conclusive.
#[derive(Debug, Clone, Default)]
pub struct TextClassifier {
    always_text: HashSet<String>,
}

impl TextClassifier {
    /// `additional_extensions` are always treated as text and take
    /// precedence over every other rule.
    pub fn new<I, S>(additional_extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            always_text: additional_extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Classify from the file name alone.
    pub fn classify_name(&self, path: &str) -> Classification {
        let ext = extension(path);
        if self.always_text.contains(&ext) || TEXT_EXTENSIONS.contains(&ext.as_str()) {
            Classification::Text
        } else if BINARY_EXTENSIONS.contains(&ext.as_str()) {
            Classification::Binary
        } else {
            Classification::Unknown
        }
    }

    /// Classify from the name, falling back to the sample when the name is
    /// inconclusive. Always definite when a sample is given.
    pub fn classify(&self, path: &str, sample: Option<&[u8]>) -> Classification {
        match (self.classify_name(path), sample) {
            (Classification::Unknown, Some(bytes)) => sniff(bytes),
            (known, _) => known,
        }
    }

    pub fn is_text_like(&self, path: &str, sample: Option<&[u8]>) -> bool {
        self.classify(path, sample).is_text()
    }
}

/// Extension of the leaf name, lowercased. A name without a dot is its own
/// extension (`LICENSE` -> `license`).
fn extension(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rsplit('.').next().unwrap_or(name).to_ascii_lowercase()
}

/// Content sniffing: NUL bytes, invalid UTF-8 or a high share of control
/// bytes mean binary. An incomplete sequence cut at the end of the sample
/// is not held against it.
pub fn sniff(bytes: &[u8]) -> Classification {
    let sample = &bytes[..bytes.len().min(SNIFF_LEN)];
    if sample.is_empty() {
        return Classification::Text;
    }
    if sample.contains(&0) {
        return Classification::Binary;
    }
    if let Err(e) = std::str::from_utf8(sample)
        && e.error_len().is_some()
    {
        return Classification::Binary;
    }

    let control = sample
        .iter()
        .filter(|&&b| (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0c | 0x1b)) || b == 0x7f)
        .count();
    if control as f64 / sample.len() as f64 > MAX_CONTROL_RATIO {
        Classification::Binary
    } else {
        Classification::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_name() {
        let classifier = TextClassifier::new(["license", ".sbt"]);
        assert_eq!(classifier.classify_name("src/main.rs"), Classification::Text);
        assert_eq!(classifier.classify_name("README.MD"), Classification::Text);
        assert_eq!(classifier.classify_name("logo.png"), Classification::Binary);
        assert_eq!(classifier.classify_name("LICENSE"), Classification::Text);
        assert_eq!(classifier.classify_name("build.sbt"), Classification::Text);
        assert_eq!(classifier.classify_name("data.xyz"), Classification::Unknown);
    }

    #[test]
    fn test_additional_extensions_win() {
        let classifier = TextClassifier::new(["dat"]);
        assert_eq!(classifier.classify_name("model.dat"), Classification::Text);
        assert_eq!(
            TextClassifier::default().classify_name("model.dat"),
            Classification::Binary
        );
    }

    #[test]
    fn test_sample_only_used_for_unknown_names() {
        let classifier = TextClassifier::default();
        assert!(classifier.is_text_like("notes.xyz", Some(b"hello\nworld")));
        assert!(!classifier.is_text_like("notes.xyz", Some(&[0x89, b'P', b'N', b'G', 0, 0])));
        assert!(!classifier.is_text_like("logo.png", Some(b"plain text")));
        assert!(!classifier.is_text_like("notes.xyz", None));
    }

    #[test]
    fn test_sniff() {
        assert_eq!(sniff(b""), Classification::Text);
        assert_eq!(sniff("héllo wörld".as_bytes()), Classification::Text);
        assert_eq!(sniff(b"a\0b"), Classification::Binary);
        assert_eq!(sniff(&[0xff, 0xfe, b'a', b'b']), Classification::Binary);
        assert_eq!(sniff(&[1, 2, 3, 4, b'a']), Classification::Binary);

        // Multi-byte character cut at the end of the sample
        let mut cut = b"abc".to_vec();
        cut.extend_from_slice(&"é".as_bytes()[..1]);
        assert_eq!(sniff(&cut), Classification::Text);
    }
}
