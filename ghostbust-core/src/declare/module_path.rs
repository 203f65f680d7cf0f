//! Dotted module and qualified-name construction for Python sources.

use std::path::Path;

/// Derive the importable module name of a source file.
///
/// Enclosing directories that are packages (contain `__init__.py`) are
/// prepended, so `pkg/sub/mod.py` becomes `pkg.sub.mod` and
/// `pkg/sub/__init__.py` becomes `pkg.sub`. A loose script is just its stem.
pub fn module_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut parts = Vec::new();
    let mut dir = path.parent();
    if stem == "__init__" {
        match dir.and_then(|d| d.file_name()) {
            Some(name) => parts.push(name.to_string_lossy().to_string()),
            None => parts.push(stem),
        }
        dir = dir.and_then(|d| d.parent());
    } else {
        parts.push(stem);
    }

    while let Some(d) = dir {
        if !d.join("__init__.py").is_file() {
            break;
        }
        match d.file_name() {
            Some(name) => parts.push(name.to_string_lossy().to_string()),
            None => break,
        }
        dir = d.parent();
    }

    parts.reverse();
    parts.join(".")
}

/// Kind of an enclosing lexical scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Class,
    Function,
}

/// Lexical scope stack that renders names the way the interpreter's
/// `__qualname__` does: `Outer.method`, `outer.<locals>.inner`.
#[derive(Debug, Clone)]
pub struct ScopeStack {
    module: String,
    frames: Vec<(ScopeKind, String)>,
}

impl ScopeStack {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            frames: Vec::new(),
        }
    }

    pub fn push(&mut self, kind: ScopeKind, name: impl Into<String>) {
        self.frames.push((kind, name.into()));
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// Kind of the innermost scope, `None` at module level.
    pub fn innermost(&self) -> Option<ScopeKind> {
        self.frames.last().map(|(kind, _)| *kind)
    }

    /// Qualified name of `name` defined in the current scope.
    pub fn qualify(&self, name: &str) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(self.frames.len() * 2 + 2);
        if !self.module.is_empty() {
            parts.push(&self.module);
        }
        for (kind, frame) in &self.frames {
            parts.push(frame);
            if *kind == ScopeKind::Function {
                parts.push("<locals>");
            }
        }
        parts.push(name);
        parts.join(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn create_temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("ghostbust_module_path_test")
            .join(format!("{}_{}", name, std::process::id()));
        if dir.exists() {
            fs::remove_dir_all(&dir).ok();
        }
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_loose_script() {
        let dir = create_temp_dir("loose");
        assert_eq!(module_name(&dir.join("script.py")), "script");
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_package_module() {
        let dir = create_temp_dir("package");
        fs::create_dir_all(dir.join("pkg/sub")).unwrap();
        fs::write(dir.join("pkg/__init__.py"), "").unwrap();
        fs::write(dir.join("pkg/sub/__init__.py"), "").unwrap();

        assert_eq!(module_name(&dir.join("pkg/sub/mod.py")), "pkg.sub.mod");
        assert_eq!(module_name(&dir.join("pkg/sub/__init__.py")), "pkg.sub");
        assert_eq!(module_name(&dir.join("pkg/top.py")), "pkg.top");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_qualify_nested_scopes() {
        let mut scopes = ScopeStack::new("app");
        assert_eq!(scopes.qualify("main"), "app.main");

        scopes.push(ScopeKind::Class, "Server");
        assert_eq!(scopes.qualify("start"), "app.Server.start");

        scopes.push(ScopeKind::Function, "start");
        assert_eq!(scopes.qualify("on_ready"), "app.Server.start.<locals>.on_ready");
        assert_eq!(scopes.innermost(), Some(ScopeKind::Function));

        scopes.pop();
        scopes.pop();
        assert_eq!(scopes.innermost(), None);
    }
}
