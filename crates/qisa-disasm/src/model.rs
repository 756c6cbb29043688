use anyhow::Result;
use std::path::Path;

/// Raw program bytes as read from disk.
#[derive(Debug, Clone)]
pub struct Image {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Image {
    pub fn word_count(&self) -> usize {
        self.bytes.len() / 4
    }

    pub fn trailing_bytes(&self) -> usize {
        self.bytes.len() % 4
    }
}

pub fn load_raw_bin(path: &Path, skip: usize, len: Option<usize>) -> Result<Image> {
    let file = std::fs::read(path)?;
    anyhow::ensure!(!file.is_empty(), "{} is empty", path.display());
    anyhow::ensure!(skip <= file.len(), "--skip exceeds file size");
    let mut payload = &file[skip..];
    if let Some(lim) = len {
        anyhow::ensure!(lim <= payload.len(), "--len exceeds remaining file size after skip");
        payload = &payload[..lim];
    }
    Ok(Image { name: path.display().to_string(), bytes: payload.to_vec() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loader_applies_skip_and_len() {
        let path = std::env::temp_dir().join("_qisa_disasm_model.bin");
        std::fs::write(&path, [0u8, 1, 2, 3, 4, 5, 6]).unwrap();
        let img = load_raw_bin(&path, 2, Some(5)).unwrap();
        assert_eq!(img.bytes, vec![2, 3, 4, 5, 6]);
        assert_eq!(img.word_count(), 1);
        assert_eq!(img.trailing_bytes(), 1);
        assert!(load_raw_bin(&path, 8, None).is_err());
        assert!(load_raw_bin(&path, 0, Some(8)).is_err());
        let _ = std::fs::remove_file(&path);
    }
}
