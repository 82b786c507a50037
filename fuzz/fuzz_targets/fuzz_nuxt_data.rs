#![no_main]
use libfuzzer_sys::fuzz_target;
use scraper::Html;

use mcp_upwork::adapters::diagnostics::NoopDiagnostics;
use mcp_upwork::adapters::extract::{ExtractContext, nuxt_data};
use mcp_upwork::domain::UPWORK_ORIGIN;

fuzz_target!(|data: &[u8]| {
    if let Ok(payload) = std::str::from_utf8(data) {
        let sink = NoopDiagnostics;
        let ctx = ExtractContext {
            job_id: "~01fuzz",
            authenticated: false,
            origin: UPWORK_ORIGIN,
            diagnostics: &sink,
        };
        let document = Html::parse_document(payload);
        let _ = nuxt_data::extract(payload, &document, &ctx);
    }
});
