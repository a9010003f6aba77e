//! Install and resource directory discovery.

use std::path::PathBuf;

/// Locations the tool resolves its bundled collaborators from.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory the executable was installed to; the table helper script
    /// lives next to the binary.
    pub app_dir: PathBuf,
    /// Directory holding the math typesetting bundle.
    pub resource_dir: PathBuf,
}

impl AppPaths {
    /// Discover paths from the running process: the executable's directory
    /// for the helper script, the startup working directory for resources.
    pub fn discover() -> Self {
        let app_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Into::into))
            .unwrap_or_else(|| PathBuf::from("."));
        let resource_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            app_dir,
            resource_dir,
        }
    }

    /// Path of the table helper script invoked per directive.
    pub fn helper_script(&self) -> PathBuf {
        self.app_dir.join("markdown-table.py")
    }

    /// Path of the math typesetting script passed to the converter.
    pub fn mathjax_script(&self) -> PathBuf {
        self.resource_dir.join("es5").join("tex-svg-full.js")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_script_lives_in_app_dir() {
        let paths = AppPaths {
            app_dir: "/opt/pandoc-preview".into(),
            resource_dir: "/home/user".into(),
        };
        assert_eq!(
            paths.helper_script(),
            PathBuf::from("/opt/pandoc-preview/markdown-table.py")
        );
        assert_eq!(
            paths.mathjax_script(),
            PathBuf::from("/home/user/es5/tex-svg-full.js")
        );
    }
}
