//! 通用工具函数

/// 从存储路径中取出文件名（最后一个 `/` 或 `\` 之后的部分）
pub fn file_name_from_path(file_path: &str) -> &str {
    match file_path.rsplit(['/', '\\']).next() {
        Some(name) if !name.is_empty() => name,
        _ => file_path,
    }
}

/// 去除首尾空白，空串视为未填写
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// 日志中遮蔽CPF，仅保留前3位
pub fn mask_cpf(cpf: &str) -> String {
    let visible: String = cpf.chars().take(3).collect();
    if cpf.chars().count() <= 3 {
        "***".to_string()
    } else {
        format!("{}***", visible)
    }
}
