/// 转义写入 XML/XHTML 的自由文本。`&` 必须最先替换，否则会把后面生成的实体再转义一次。
pub(crate) fn escape_markup(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
