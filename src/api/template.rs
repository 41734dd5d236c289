//! The OTP page.

const STYLE: &str = "body{font-family:sans-serif;max-width:40em;margin:3em auto;padding:0 1em}\
.caution{border-left:4px solid #c00;background:#fdf2f2;padding:.5em 1em;margin-top:1em}\
input[name=otp]{padding:.5em;font-size:medium;width:70%}";

/// Form asking for an OTP. `error` is shown above the input when set.
pub(crate) fn otp_form(action: &str, state_id: &str, error: Option<&str>) -> String {
    let error = error.map_or_else(String::new, |message| {
        format!(
            "<div class=\"caution\"><h5>Error</h5><p>{}</p></div>",
            escape(message)
        )
    });

    page(&format!(
        "<h2>Authenticate with your YubiKey</h2>\
<form action=\"{action}\" method=\"post\" name=\"f\">\
<p>Insert your YubiKey into a USB port and touch its button to generate a one time password.</p>\
<p><input id=\"otp\" type=\"text\" name=\"otp\" autocomplete=\"off\" autofocus></p>\
<input type=\"hidden\" name=\"StateId\" value=\"{state_id}\">\
{error}\
</form>",
        action = escape(action),
        state_id = escape(state_id),
    ))
}

/// Page shown when no OTP form can be offered.
pub(crate) fn error_page(message: &str) -> String {
    page(&format!(
        "<h2>Error</h2><div class=\"caution\"><p>{}</p></div>",
        escape(message)
    ))
}

fn page(body: &str) -> String {
    format!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\">\
<title>YubiKey</title><style>{STYLE}</style></head><body>{body}</body></html>"
    )
}

pub(crate) fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
