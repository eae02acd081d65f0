pub mod source {
    use std::collections::HashMap;
    use std::fs;
    use std::io::{Error, ErrorKind};
    use std::path::Path;

    /// Where the tokenizer reads source text from.
    pub trait SourceProvider {
        fn read_source(&mut self, path: &str) -> Result<String, Error>;
    }

    /// Reads sources straight off the filesystem.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct FileSources;

    impl SourceProvider for FileSources {
        fn read_source(&mut self, path: &str) -> Result<String, Error> {
            fs::read_to_string(path)
        }
    }

    /// In-memory file set keyed by path string.
    #[derive(Debug, Default, Clone)]
    pub struct MemorySources {
        files: HashMap<String, String>,
    }

    impl MemorySources {
        pub fn new() -> MemorySources {
            MemorySources { files: HashMap::new() }
        }

        pub fn with(mut self, path: &str, text: &str) -> MemorySources {
            self.insert(path, text);
            self
        }

        pub fn insert(&mut self, path: &str, text: &str) {
            self.files.insert(path.to_string(), text.to_string());
        }
    }

    impl SourceProvider for MemorySources {
        fn read_source(&mut self, path: &str) -> Result<String, Error> {
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| Error::new(ErrorKind::NotFound, "no such source"))
        }
    }

    /// Relative include paths are taken from the including file's directory.
    pub fn resolve_include(includer: &str, target: &str) -> String {
        if Path::new(target).is_absolute() {
            return target.to_string();
        }

        match Path::new(includer).parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                dir.join(target).to_string_lossy().into_owned()
            }
            _ => target.to_string(),
        }
    }
}
