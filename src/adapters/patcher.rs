use crate::domain::model::SecretMap;
use crate::domain::ports::Storage;
use crate::utils::error::{Result, SetupError};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z0-9_]+)\}").expect("static regex"));

static ASSIGNMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(\s*(?:export\s+)?)([A-Za-z_][A-Za-z0-9_]*)=\s*(""|'')?\s*$"#)
        .expect("static regex")
});

/// radarr → RADARR_API_KEY
pub fn env_var_name(service: &str) -> String {
    format!("{}_API_KEY", service.to_uppercase().replace('-', "_"))
}

pub fn secret_env_vars(secrets: &SecretMap) -> BTreeMap<String, String> {
    secrets
        .iter()
        .map(|(service, key)| (env_var_name(service), key.clone()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchResult {
    pub content: String,
    pub replacements: usize,
}

/// 替換 `${NAME}` 與空白的 `NAME=`；其他內容逐位元組保留
pub fn patch_placeholders(content: &str, values: &BTreeMap<String, String>) -> PatchResult {
    let mut output = String::with_capacity(content.len());
    let mut replacements = 0;

    for line in content.split_inclusive('\n') {
        let (body, ending) = split_line_ending(line);

        if let Some(caps) = ASSIGNMENT_RE.captures(body) {
            if let Some(value) = values.get(&caps[2]) {
                output.push_str(&caps[1]);
                output.push_str(&caps[2]);
                output.push('=');
                output.push_str(value);
                output.push_str(ending);
                replacements += 1;
                continue;
            }
        }

        let patched = TOKEN_RE.replace_all(body, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => {
                replacements += 1;
                value.clone()
            }
            None => caps[0].to_string(),
        });
        output.push_str(&patched);
        output.push_str(ending);
    }

    PatchResult {
        content: output,
        replacements,
    }
}

fn split_line_ending(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

/// 就地改寫單一檔案，回傳替換次數；沒有變更時不寫回
pub async fn patch_file<S: Storage>(
    storage: &S,
    path: &str,
    values: &BTreeMap<String, String>,
) -> Result<usize> {
    let bytes = storage.read_file(path).await?;
    let content = String::from_utf8(bytes).map_err(|_| SetupError::Config {
        message: format!("{} is not valid UTF-8", path),
    })?;

    let result = patch_placeholders(&content, values);
    if result.content != content {
        storage.write_file(path, result.content.as_bytes()).await?;
    }
    Ok(result.replacements)
}
