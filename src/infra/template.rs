//! 配置文件模板渲染
//!
//! 简单的 `{{KEY}}` 文本替换。模板内嵌在各个 service 模块中，
//! 渲染后若仍有未替换的占位符则视为错误。

use crate::error::{HostctlError, Result};

/// 渲染模板，把每个 `{{KEY}}` 替换为对应的值
pub fn render(template: &str, vars: &[(&str, &str)]) -> Result<String> {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{{}}}}}", key), value);
    }

    // 检查遗漏的占位符
    if let Some(name) = first_placeholder(&out) {
        return Err(HostctlError::Template(name));
    }

    Ok(out)
}

/// 找出第一个未替换的 `{{...}}` 占位符名
fn first_placeholder(text: &str) -> Option<String> {
    let start = text.find("{{")?;
    let rest = &text[start + 2..];
    let end = rest.find("}}")?;
    let name = &rest[..end];
    // 只把「合法的占位符名」当作遗漏，nginx 配置里的 `{{` 不会出现合法名
    if !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Some(name.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_replaces_all_occurrences() {
        let out = render("{{NAME}} and {{NAME}} on {{PORT}}", &[("NAME", "app"), ("PORT", "8080")])
            .unwrap();
        assert_eq!(out, "app and app on 8080");
    }

    #[test]
    fn test_render_rejects_unresolved_placeholder() {
        let err = render("listen {{PORT}};", &[("NAME", "app")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_render_plain_text_passthrough() {
        let out = render("no placeholders here", &[]).unwrap();
        assert_eq!(out, "no placeholders here");
    }

    #[test]
    fn test_first_placeholder_ignores_non_identifier() {
        // docker --format 的 go-template 语法不应被当作占位符
        assert_eq!(first_placeholder("docker ps --format '{{.Names}}'"), None);
        assert_eq!(first_placeholder("{{SERVER_NAME}}"), Some("SERVER_NAME".to_string()));
    }
}
