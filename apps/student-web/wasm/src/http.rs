//! Backend requests over the browser `fetch` API

use answer_sheet_core::{ApiRequest, FetchError};
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Request, RequestInit, RequestMode, Response};

/// Perform `request` against `api_base` and decode the JSON body.
///
/// A non-2xx status becomes [`FetchError::Status`], using the body's
/// `error` field when the backend sent one.
pub async fn perform(api_base: &str, request: &ApiRequest) -> Result<Value, FetchError> {
    let window = web_sys::window().ok_or_else(|| FetchError::Network("No window".to_string()))?;

    let opts = RequestInit::new();
    opts.set_method(request.method.as_str());
    opts.set_mode(RequestMode::Cors);
    if let Some(body) = &request.body {
        let body_str = serde_json::to_string(body)?;
        opts.set_body(&JsValue::from_str(&body_str));
    }

    let url = request.url(api_base);
    let js_request = Request::new_with_str_and_init(&url, &opts).map_err(network_error)?;
    if request.body.is_some() {
        js_request
            .headers()
            .set("Content-Type", "application/json")
            .map_err(network_error)?;
    }

    let response = JsFuture::from(window.fetch_with_request(&js_request))
        .await
        .map_err(network_error)?;
    let response: Response = response.dyn_into().map_err(network_error)?;

    let text = JsFuture::from(response.text().map_err(network_error)?)
        .await
        .map_err(network_error)?
        .as_string()
        .unwrap_or_default();

    if !response.ok() {
        let body = serde_json::from_str::<Value>(&text).ok();
        return Err(FetchError::from_status(response.status(), body.as_ref()));
    }

    Ok(serde_json::from_str(&text)?)
}

/// Readable text for a JavaScript exception
pub fn describe_js_error(err: &JsValue) -> String {
    if let Some(s) = err.as_string() {
        return s;
    }
    if let Some(e) = err.dyn_ref::<js_sys::Error>() {
        return String::from(e.message());
    }
    format!("{:?}", err)
}

fn network_error(err: JsValue) -> FetchError {
    FetchError::Network(describe_js_error(&err))
}

#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_describe_js_error_prefers_message() {
        let err: JsValue = js_sys::Error::new("offline").into();
        assert_eq!(describe_js_error(&err), "offline");
        assert_eq!(describe_js_error(&JsValue::from_str("plain")), "plain");
    }

    #[wasm_bindgen_test]
    async fn test_unreachable_host_is_network_error() {
        let request = answer_sheet_core::api::load_template("t1");
        let err = perform("http://127.0.0.1:9", &request).await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
    }
}
