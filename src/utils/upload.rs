use actix_multipart::Multipart;
use chrono::Utc;
use futures::TryStreamExt;
use rand::Rng;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ApiError;

/// Répertoire de stockage des fichiers uploadés.
pub fn uploads_dir() -> PathBuf {
    PathBuf::from(env::var("UPLOADS_DIR").unwrap_or_else(|_| "uploads".to_string()))
}

/// Fichier écrit sur disque pendant le parsing d'un formulaire multipart.
#[derive(Debug, Clone)]
pub struct SavedFile {
    pub original_name: String,
    // Chemin relatif stocké en base, ex. "uploads/1724760000123-48392017.pdf"
    pub relative_path: String,
    pub absolute_path: PathBuf,
}

/// Contenu d'un formulaire multipart : champs texte + fichiers déjà écrits.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub fields: HashMap<String, String>,
    pub files: Vec<SavedFile>,
}

/// Nom de stockage anti-collision : millisecondes + suffixe aléatoire,
/// en conservant l'extension d'origine. Le nom lisible ne vit qu'en base.
pub fn storage_name(original: &str) -> String {
    let ext = Path::new(original)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!("{}-{}{}", Utc::now().timestamp_millis(), suffix, ext)
}

/// Consomme un flux multipart : bufferise chaque partie en entier, écrit les
/// fichiers sous `uploads_dir()` et collecte les champs texte. En cas d'échec
/// en aval, l'appelant doit repasser par `cleanup_files`.
pub async fn collect_form(payload: &mut Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();
    let dir = uploads_dir();

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| ApiError::Validation(format!("Invalid multipart payload: {}", e)))?
    {
        let disposition = field.content_disposition().clone();
        let field_name = disposition.get_name().unwrap_or("").to_string();
        let filename = disposition.get_filename().map(|f| f.to_string());

        let mut buf: Vec<u8> = Vec::new();
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|e| ApiError::Validation(format!("Invalid multipart payload: {}", e)))?
        {
            buf.extend_from_slice(&chunk);
        }

        match filename {
            Some(original_name) if !original_name.is_empty() => {
                let stored = storage_name(&original_name);
                let absolute_path = dir.join(&stored);

                fs::write(&absolute_path, &buf).map_err(|e| {
                    ApiError::Internal(format!("Failed to store uploaded file: {}", e))
                })?;

                form.files.push(SavedFile {
                    original_name,
                    relative_path: format!("uploads/{}", stored),
                    absolute_path,
                });
            }
            _ => {
                let value = String::from_utf8_lossy(&buf).to_string();
                form.fields.insert(field_name, value);
            }
        }
    }

    Ok(form)
}

/// Nettoyage best-effort après un rollback : un fichier déjà absent n'est
/// pas une erreur.
pub fn cleanup_files(files: &[SavedFile]) {
    for file in files {
        if let Err(e) = fs::remove_file(&file.absolute_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %file.absolute_path.display(), "orphan upload left behind: {}", e);
            }
        }
    }
}

/// Supprime le fichier référencé par un chemin relatif stocké en base.
pub fn remove_stored_file(relative_path: &str) {
    let Some(name) = Path::new(relative_path).file_name() else {
        return;
    };

    let absolute = uploads_dir().join(name);
    if let Err(e) = fs::remove_file(&absolute) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %absolute.display(), "failed to remove material file: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_name_keeps_extension() {
        let name = storage_name("Notatki z lekcji.pdf");
        assert!(name.ends_with(".pdf"));
        assert!(!name.contains(' '));
    }

    #[test]
    fn test_storage_name_without_extension() {
        let name = storage_name("README");
        assert!(!name.contains('.'));
    }

    #[test]
    fn test_storage_names_are_unique() {
        let a = storage_name("a.png");
        let b = storage_name("a.png");
        assert_ne!(a, b);
    }
}
