use crate::error::MergeWarning;

fn sanitize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in value.chars() {
        if ch.is_whitespace() {
            if !out.is_empty() && !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else if !ch.is_control() {
            out.push(ch);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "na".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn format_line(stage: &str, warning: &MergeWarning) -> String {
    format!(
        "MERGE_WARN code={} stage={} path={} reason={}",
        sanitize_value(warning.code.as_str()),
        sanitize_value(stage),
        sanitize_value(&warning.path),
        sanitize_value(&warning.message),
    )
}

pub fn emit(stage: &str, warning: &MergeWarning) {
    eprintln!("{}", format_line(stage, warning));
}
