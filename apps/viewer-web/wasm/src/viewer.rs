//! Document render surface.
//!
//! Once a session is established, fetches the single protected document,
//! validates the bytes, renders each page through the pdf.js bridge, and
//! stamps every page canvas with an identity watermark. The watermark text
//! is recomputed on every render call rather than cached, because the
//! session identity can change between loads.

use std::cell::RefCell;
use std::f64::consts::PI;
use std::rc::Rc;

use docgate_core::{
    watermark, AuthMethod, Credential, FetchError, SessionController, ViewerConfig,
};
use js_sys::Uint8Array;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    console, CanvasRenderingContext2d, Document, Element, HtmlCanvasElement, Request, RequestInit,
    RequestMode, Response,
};

use crate::auth::to_js_error;
use crate::inventory::PageInventory;

// pdf.js bridge, same shape as the rest of the SDK bridges.
#[wasm_bindgen(module = "/www/js/pdf-bridge.js")]
extern "C" {
    #[wasm_bindgen(js_name = initPdfJs)]
    fn init_pdf_js_internal(worker_src: &str) -> js_sys::Promise;

    /// Resolves to `{ numPages }`.
    #[wasm_bindgen(js_name = loadPdfDocument)]
    fn load_pdf_document(data: Uint8Array) -> js_sys::Promise;

    /// Renders one page into the canvas at the given scale, sizing the
    /// canvas to the page viewport.
    #[wasm_bindgen(js_name = renderPdfPage)]
    fn render_pdf_page(page_num: u32, canvas: &HtmlCanvasElement, scale: f64) -> js_sys::Promise;
}

/// Initialize the pdf.js worker. Must run before the first load.
#[wasm_bindgen]
pub async fn init_pdf_js(worker_src: &str) -> Result<(), JsValue> {
    JsFuture::from(init_pdf_js_internal(worker_src)).await?;
    Ok(())
}

/// Renders the gated document into a container element.
#[wasm_bindgen]
pub struct DocumentSurface {
    session: Rc<RefCell<SessionController>>,
    document: Document,
    container: Element,
    api_base: String,
    config: ViewerConfig,
    page_count: u32,
}

impl DocumentSurface {
    /// Created through `AuthController::create_surface` so the session is
    /// shared with, and only ever mutated by, the auth controller.
    pub(crate) fn attach(
        session: Rc<RefCell<SessionController>>,
        container_id: &str,
        api_base: &str,
    ) -> Result<DocumentSurface, JsValue> {
        let document = web_sys::window()
            .ok_or_else(|| JsValue::from_str("No window"))?
            .document()
            .ok_or_else(|| JsValue::from_str("No document"))?;
        let container = document
            .get_element_by_id(container_id)
            .ok_or_else(|| JsValue::from_str(&format!("Container not found: {}", container_id)))?;

        Ok(DocumentSurface {
            session,
            document,
            container,
            api_base: api_base.trim_end_matches('/').to_string(),
            config: ViewerConfig::default(),
            page_count: 0,
        })
    }
}

#[wasm_bindgen]
impl DocumentSurface {
    /// Fetch and render the document. Requires an authenticated session;
    /// on any fetch or decode failure no partial render state is shown.
    /// Returns the rendered page count.
    pub async fn load_document(&mut self, file_name: &str) -> Result<u32, JsValue> {
        let (auth_method, credential) = {
            let controller = self.session.borrow();
            let session = controller.require_authenticated().map_err(to_js_error)?;
            (session.auth_method(), session.credential().cloned())
        };

        // Loading indicator for slow fetches; cleared on every exit path.
        if let Err(e) = self.container.class_list().add_1("loading") {
            console::warn_1(&e);
        }
        let result = self.fetch_and_render(file_name, auth_method, credential).await;
        let _ = self.container.class_list().remove_1("loading");
        result
    }

    /// Remove every rendered page surface.
    pub fn clear(&mut self) {
        self.container.set_inner_html("");
        self.page_count = 0;
    }

    #[wasm_bindgen(getter)]
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    #[wasm_bindgen(getter)]
    pub fn is_loaded(&self) -> bool {
        self.page_count > 0
    }
}

impl DocumentSurface {
    async fn fetch_and_render(
        &mut self,
        file_name: &str,
        auth_method: AuthMethod,
        credential: Option<Credential>,
    ) -> Result<u32, JsValue> {
        let bytes = self
            .fetch_document(file_name, auth_method, credential)
            .await
            .map_err(to_js_error)?;

        // Validate before touching any render state.
        let inventory = PageInventory::decode(&bytes).map_err(to_js_error)?;
        let page_count = inventory.page_count();

        self.clear();

        let data = Uint8Array::new_with_length(bytes.len() as u32);
        data.copy_from(&bytes);
        JsFuture::from(load_pdf_document(data)).await?;

        let mut rendered = 0;
        for page_num in 1..=page_count {
            match self.render_page(page_num, inventory.media_box(page_num)).await {
                Ok(()) => rendered += 1,
                // One bad page does not abort the rest of the document.
                Err(e) => {
                    console::error_2(&format!("Failed to render page {}:", page_num).into(), &e);
                }
            }
        }
        self.page_count = rendered;
        Ok(rendered)
    }

    async fn render_page(&self, page_num: u32, media_box: [f64; 4]) -> Result<(), JsValue> {
        let canvas = self.document.create_element("canvas")?;
        canvas.set_class_name("doc-page");
        canvas.set_id(&format!("doc-page-{}", page_num));
        let canvas: HtmlCanvasElement = canvas.dyn_into()?;

        // Pre-size from the page geometry so the layout holds steady while
        // pages render one by one; the bridge then sets the exact viewport.
        let (width, height) = scaled_dimensions(media_box, self.config.scale);
        canvas.set_width(width);
        canvas.set_height(height);
        self.container.append_child(&canvas)?;

        JsFuture::from(render_pdf_page(page_num, &canvas, self.config.scale)).await?;

        // Identity read fresh from the session on every render.
        let identity = self
            .session
            .borrow()
            .session()
            .identity()
            .map(str::to_string);
        self.stamp_watermark(&canvas, identity.as_deref())?;
        Ok(())
    }

    /// Repeating diagonal low-opacity attribution across the whole page.
    fn stamp_watermark(
        &self,
        canvas: &HtmlCanvasElement,
        identity: Option<&str>,
    ) -> Result<(), JsValue> {
        let text = match identity {
            Some(_) => watermark::attribution_text(identity),
            None => watermark::dated_text("Restricted Access", &today_iso()),
        };

        let ctx = canvas
            .get_context("2d")?
            .ok_or_else(|| JsValue::from_str("No 2d context"))?
            .dyn_into::<CanvasRenderingContext2d>()?;

        ctx.set_font(watermark::STAMP_FONT);
        ctx.set_fill_style_str(watermark::STAMP_FILL);
        ctx.set_text_align("center");

        let width = f64::from(canvas.width());
        let height = f64::from(canvas.height());
        for (x, y) in watermark::tile_positions(width, height) {
            ctx.save();
            ctx.translate(x, y)?;
            ctx.rotate(-PI / 12.0)?;
            ctx.fill_text(&text, 0.0, 0.0)?;
            ctx.restore();
        }
        Ok(())
    }

    /// POST to the external fetch collaborator. The body carries the auth
    /// method plus the bearer token or the wallet address, never both.
    async fn fetch_document(
        &self,
        file_name: &str,
        auth_method: AuthMethod,
        credential: Option<Credential>,
    ) -> Result<Vec<u8>, FetchError> {
        let body = document_request_body(file_name, auth_method, credential);
        let body_str =
            serde_json::to_string(&body).map_err(|e| FetchError::Transport(e.to_string()))?;

        let window = web_sys::window().ok_or_else(|| no_window())?;
        let url = format!("{}/get-file", self.api_base);

        let opts = RequestInit::new();
        opts.set_method("POST");
        opts.set_mode(RequestMode::Cors);
        opts.set_body(&JsValue::from_str(&body_str));

        let request = Request::new_with_str_and_init(&url, &opts).map_err(transport)?;
        request
            .headers()
            .set("Content-Type", "application/json")
            .map_err(transport)?;

        let response = JsFuture::from(window.fetch_with_request(&request))
            .await
            .map_err(transport)?;
        let response: Response = response.dyn_into().map_err(transport)?;

        if !response.ok() {
            return Err(FetchError::from_status(response.status()));
        }

        let buffer = JsFuture::from(response.array_buffer().map_err(transport)?)
            .await
            .map_err(transport)?;
        Ok(Uint8Array::new(&buffer).to_vec())
    }
}

/// Canvas pixel size for a `[x, y, width, height]` media box at a scale.
fn scaled_dimensions(media_box: [f64; 4], scale: f64) -> (u32, u32) {
    let width = (media_box[2] * scale).round().max(1.0) as u32;
    let height = (media_box[3] * scale).round().max(1.0) as u32;
    (width, height)
}

fn today_iso() -> String {
    let now_ms = js_sys::Date::now() as i64;
    chrono::DateTime::from_timestamp_millis(now_ms)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

fn no_window() -> FetchError {
    FetchError::Transport("No window".to_string())
}

fn transport(e: JsValue) -> FetchError {
    FetchError::Transport(
        e.as_string()
            .unwrap_or_else(|| "document fetch failed".to_string()),
    )
}

fn document_request_body(
    file_name: &str,
    auth_method: AuthMethod,
    credential: Option<Credential>,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "fileName": file_name,
        "authType": auth_method.as_str(),
    });
    match credential {
        Some(Credential::Bearer(token)) => {
            body["token"] = serde_json::Value::String(token);
        }
        Some(Credential::Wallet(address)) => {
            body["walletAddress"] = serde_json::Value::String(address);
        }
        None => {}
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_for_email_session() {
        let body = document_request_body(
            "Paper.pdf",
            AuthMethod::Email,
            Some(Credential::Bearer("did:token".to_string())),
        );
        assert_eq!(body["fileName"], "Paper.pdf");
        assert_eq!(body["authType"], "email");
        assert_eq!(body["token"], "did:token");
        // Never both proofs in one request.
        assert!(body.get("walletAddress").is_none());
    }

    #[test]
    fn test_scaled_dimensions_from_media_box() {
        // US Letter at the default 1.5x scale.
        assert_eq!(scaled_dimensions([0.0, 0.0, 612.0, 792.0], 1.5), (918, 1188));
        // A4, fractional points round to whole pixels.
        assert_eq!(scaled_dimensions([0.0, 0.0, 595.3, 841.9], 1.5), (893, 1263));
        // Degenerate boxes never produce a zero-sized canvas.
        assert_eq!(scaled_dimensions([0.0, 0.0, 0.0, 0.0], 1.5), (1, 1));
    }

    #[test]
    fn test_request_body_for_wallet_session() {
        let body = document_request_body(
            "Paper.pdf",
            AuthMethod::Wallet,
            Some(Credential::Wallet("0xdef456".to_string())),
        );
        assert_eq!(body["authType"], "wallet");
        assert_eq!(body["walletAddress"], "0xdef456");
        assert!(body.get("token").is_none());
    }
}
