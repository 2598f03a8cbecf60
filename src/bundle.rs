use std::fs;
use std::path::Path;

use tracing::info;

use crate::errors::{AppError, AppResult};

/// Concatenates every `.js` file in `folder`, sorted by file name, into
/// `output`. Each file is preceded by a `// <file name>` marker line.
pub fn merge_js_files<P: AsRef<Path>, Q: AsRef<Path>>(folder: P, output: Q) -> AppResult<usize> {
    let folder = folder.as_ref();
    let output = output.as_ref();
    if !folder.is_dir() {
        return Err(AppError::Path(format!(
            "script folder not found at {}",
            folder.display()
        )));
    }

    let mut entries = fs::read_dir(folder)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| name.ends_with(".js"))
        .collect::<Vec<_>>();
    entries.sort();

    let mut bundle = String::new();
    for name in &entries {
        let contents = fs::read_to_string(folder.join(name))?;
        bundle.push_str(&format!("\n// {name}\n{contents}\n"));
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, bundle)?;
    info!(
        target: "bundle",
        output = %output.display(),
        files = entries.len(),
        "scripts merged"
    );
    Ok(entries.len())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn merges_scripts_in_name_order() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("province");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("b.js"), "var b = 2;").unwrap();
        fs::write(src.join("a.js"), "var a = 1;").unwrap();
        fs::write(src.join("notes.txt"), "ignored").unwrap();

        let output = dir.path().join("dist").join("provinces.js");
        let merged = merge_js_files(&src, &output).unwrap();
        assert_eq!(merged, 2);

        let bundle = fs::read_to_string(&output).unwrap();
        assert_eq!(bundle, "\n// a.js\nvar a = 1;\n\n// b.js\nvar b = 2;\n");
    }

    #[test]
    fn missing_folder_is_an_error() {
        let dir = tempdir().unwrap();
        let err = merge_js_files(dir.path().join("absent"), dir.path().join("out.js")).unwrap_err();
        assert!(matches!(err, AppError::Path(_)));
        assert!(!dir.path().join("out.js").exists());
    }
}
