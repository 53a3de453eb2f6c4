//! Account settings: username, password, avatar

use std::path::Path;

use anyhow::{bail, Context as _, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use super::{prompt, Context};
use crate::output::Output;

pub async fn username(ctx: &Context, new_username: String, output: &Output) -> Result<()> {
    let session = ctx.require_session().await?;
    ctx.client
        .update_username(&session.token, &new_username)
        .await
        .context("Failed to change username")?;

    output.success(&format!(
        "Username changed from {} to {}",
        session.user.username,
        new_username.trim()
    ));
    Ok(())
}

pub async fn password(ctx: &Context, output: &Output) -> Result<()> {
    let session = ctx.require_session().await?;
    let old_password = prompt("Current password")?;
    let new_password = prompt("New password")?;

    ctx.client
        .update_password(&session.token, &old_password, &new_password)
        .await
        .context("Failed to change password")?;

    output.success("Password changed");
    Ok(())
}

/// Upload an image file as the avatar, or clear it
pub async fn avatar(ctx: &Context, file: Option<&Path>, output: &Output) -> Result<()> {
    let data_url = file.map(image_data_url).transpose()?;

    let session = ctx.require_session().await?;
    ctx.client
        .update_avatar(&session.token, data_url.as_deref())
        .await
        .context("Failed to update avatar")?;

    match file {
        Some(path) => output.success(&format!("Avatar set from {}", path.display())),
        None => output.success("Avatar removed"),
    }
    Ok(())
}

/// Encode an image file as a `data:image/...;base64,` URL
pub fn image_data_url(path: &Path) -> Result<String> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let mime = match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        other => bail!(
            "Unsupported image type '{}'. Use png, jpg, gif or webp.",
            other
        ),
    };

    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read image: {}", path.display()))?;
    Ok(format!("data:{};base64,{}", mime, STANDARD.encode(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_image_data_url() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("me.PNG");
        std::fs::write(&path, b"abc").unwrap();

        let url = image_data_url(&path).unwrap();
        assert_eq!(url, "data:image/png;base64,YWJj");
    }

    #[test]
    fn test_image_data_url_rejects_other_files() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.txt");
        std::fs::write(&path, b"abc").unwrap();

        let err = image_data_url(&path).unwrap_err();
        assert!(err.to_string().contains("Unsupported image type"));
    }

    #[test]
    fn test_image_data_url_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        assert!(image_data_url(&temp_dir.path().join("gone.jpg")).is_err());
    }
}
