#![no_main]
use libfuzzer_sys::fuzz_target;

use mcp_upwork::adapters::diagnostics::NoopDiagnostics;
use mcp_upwork::adapters::extract::{ExtractContext, extract};
use mcp_upwork::domain::UPWORK_ORIGIN;

fuzz_target!(|data: &[u8]| {
    if let Ok(html) = std::str::from_utf8(data) {
        let sink = NoopDiagnostics;
        let ctx = ExtractContext {
            job_id: "~01fuzz",
            authenticated: data.first().is_some_and(|b| b & 1 == 1),
            origin: UPWORK_ORIGIN,
            diagnostics: &sink,
        };
        if let Ok(record) = extract(html, &ctx) {
            let _ = serde_json::to_string(&record);
        }
    }
});
