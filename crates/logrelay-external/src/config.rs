//! Configuration artifact handed to the tool on every invocation.

/// Settings that never vary between invocations.
const FIXED_DIRECTIVES: &[(&str, &str)] = &[
    ("CustomTooShort", "2200"),
    ("CompressRaw", "True"),
    ("Anonymous", "False"),
    ("SaveOutJSON", "True"),
    ("RawTimelineArrays", "True"),
    ("ParseCombatReplay", "True"),
    ("DetailledWvW", "True"),
    ("ParsePhases", "True"),
    ("ComputeDamageModifiers", "True"),
    ("SaveOutHTML", "False"),
    ("SaveOutCSV", "False"),
    ("SaveOutXML", "False"),
    ("SaveOutTrace", "True"),
    ("UploadToDPSReports", "False"),
    ("UploadToWingman", "False"),
    ("SendEmbedToWebhook", "False"),
    ("SendSimpleMessageToWebhook", "False"),
    ("AutoParse", "False"),
    ("AutoAdd", "False"),
    ("ParseMultipleLogs", "False"),
];

const TRAILING_DIRECTIVES: &[(&str, &str)] = &[
    ("SaveAtOut", "False"),
    ("IndentJSON", "False"),
    ("SingleThreaded", "False"),
    ("AddPoVProf", "False"),
    ("PopulateHourLimit", "0"),
    ("MemoryLimit", "0"),
    ("WebhookURL", ""),
    ("HtmlExternalScripts", "False"),
    ("HtmlCompressJson", "False"),
    ("HtmlExternalScriptsCdn", ""),
    ("HtmlExternalScriptsPath", ""),
    ("LightTheme", "False"),
];

/// File name of the artifact inside each output directory.
pub const CONFIG_FILE_NAME: &str = "analysis.conf";

/// Build the `key=value` artifact pointing the tool at `out_location`.
pub fn build_config(out_location: &str, auth_token: Option<&str>) -> String {
    let mut lines: Vec<String> = FIXED_DIRECTIVES
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    lines.push(format!("OutLocation={}", out_location));
    lines.push(format!("DPSReportUserToken={}", auth_token.unwrap_or_default()));
    lines.extend(
        TRAILING_DIRECTIVES
            .iter()
            .map(|(key, value)| format!("{}={}", key, value)),
    );
    lines.join("\n")
}
