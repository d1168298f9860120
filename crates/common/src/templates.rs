use error_stack::{Report, ResultExt};
use handlebars::Handlebars;
use serde_json::json;

use crate::error::AlipayError;
use crate::params::ParamMap;

/// Hidden form that submits itself as soon as the browser parses it.
pub const AUTO_SUBMIT_FORM_TEMPLATE: &str = r#"<form id='submit' name='submit' action='{{action}}' method='{{method}}' style='display:none;'>
{{#each fields}}<input type='hidden' name='{{this.name}}' value='{{this.value}}'/>
{{/each}}<input type='submit' value='submit' style='display:none;'></form><script>document.forms['submit'].submit();</script>"#;

/// Renders [`AUTO_SUBMIT_FORM_TEMPLATE`] for `params`, in their current order.
///
/// Field names and values are HTML-escaped.
///
/// # Errors
///
/// Returns [`AlipayError::Configuration`] if the template fails to render.
pub fn render_auto_submit_form(
    action: &str,
    method: &str,
    params: &ParamMap,
) -> Result<String, Report<AlipayError>> {
    let fields: Vec<_> = params
        .iter()
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect();

    let data = json!({
        "action": action,
        "method": method,
        "fields": fields,
    });

    Handlebars::new()
        .render_template(AUTO_SUBMIT_FORM_TEMPLATE, &data)
        .change_context(AlipayError::Configuration {
            field: "page form template".into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_auto_submit_form() {
        let mut params = ParamMap::new();
        params.insert("app_id", "2021").expect("should insert");
        params
            .insert("biz_content", r#"{"subject":"<tea>"}"#)
            .expect("should insert");

        let html = render_auto_submit_form("https://gw.example/gateway.do", "POST", &params)
            .expect("should render");

        assert!(html.starts_with("<form id='submit'"));
        assert!(html.contains("method='POST'"));
        assert!(html.contains("name='app_id' value='2021'"));
        assert!(html.contains("&quot;subject&quot;"));
        assert!(html.contains("&lt;tea&gt;"));
        assert!(!html.contains("<tea>"));
        assert!(html.ends_with("<script>document.forms['submit'].submit();</script>"));

        let app_id = html.find("name='app_id'").expect("app_id input");
        let biz = html.find("name='biz_content'").expect("biz_content input");
        assert!(app_id < biz);
    }
}
