pub const ENHANCE: &str = include_str!("../data/prompts/enhance.txt");

/// Replace `{{key}}` placeholders in a template string in a single pass.
/// Substituted values are never scanned for further placeholders.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let substitution = after.find("}}").and_then(|end| {
            let key = &after[..end];
            vars.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (end, *value))
        });

        match substitution {
            Some((end, value)) => {
                result.push_str(value);
                rest = &after[end + 2..];
            }
            None => {
                result.push_str("{{");
                rest = after;
            }
        }
    }

    result.push_str(rest);
    result
}
