use crate::config::{SessionDirs, ViewerConfig};
use crate::features::storage::AssetRef;
use crate::features::viewer::{
    handle_export, handle_navigate, handle_restore_index, handle_screen_start,
    handle_screen_stop, handle_view_created, render_viewer_screen, Direction, StartRequest,
};
use crate::i18n::update_locale;
use crate::logging::log_error;
use crate::state::AppState;

use jni::objects::{JClass, JString};
use jni::sys::jstring;
use jni::JNIEnv;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{cell::RefCell, ptr};

// PDFium handles are bound to the thread that opened them; every command
// arrives on the Android main thread.
thread_local! {
    static STATE: RefCell<AppState> = RefCell::new(AppState::new());
}

#[derive(Deserialize, Default)]
pub(crate) struct Command {
    action: String,
    page_index: Option<u32>,
    cache_dir: Option<String>,
    external_files_dir: Option<String>,
    pdf_asset: Option<AssetRef>,
    overlay_asset: Option<AssetRef>,
    config: Option<ViewerConfig>,
    snapshot: Option<String>,
    locale: Option<String>,
    error: Option<String>,
}

enum Action {
    Init,
    Reset,
    ViewCreated { page_index: Option<u32> },
    ScreenStart(StartRequest),
    ScreenStop,
    Navigate(Direction),
    Save,
    Snapshot,
    Restore { snapshot: String },
    SetLocale { locale: String },
}

fn parse_action(command: Command) -> Result<Action, String> {
    let Command {
        action,
        page_index,
        cache_dir,
        external_files_dir,
        mut pdf_asset,
        mut overlay_asset,
        config,
        snapshot,
        locale,
        error,
    } = command;

    // Only screen_start consumes assets; descriptors sent with anything else
    // are closed here.
    if action != "screen_start" {
        for asset in [pdf_asset.take(), overlay_asset.take()].into_iter().flatten() {
            asset.discard();
        }
    }

    match action.as_str() {
        "init" => Ok(Action::Init),
        "reset" => Ok(Action::Reset),
        "view_created" => Ok(Action::ViewCreated { page_index }),
        "screen_start" => {
            let Some(pdf_asset) = pdf_asset else {
                if let Some(asset) = overlay_asset {
                    asset.discard();
                }
                return Err("missing_pdf_asset".into());
            };
            Ok(Action::ScreenStart(StartRequest {
                dirs: SessionDirs::resolve(cache_dir.as_deref(), external_files_dir.as_deref()),
                pdf_asset,
                overlay_asset,
                config: config.unwrap_or_default(),
            }))
        }
        "screen_stop" => Ok(Action::ScreenStop),
        "previous_page" => Ok(Action::Navigate(Direction::Previous)),
        "next_page" => Ok(Action::Navigate(Direction::Next)),
        "save" => Ok(Action::Save),
        "snapshot" => Ok(Action::Snapshot),
        "restore" => snapshot
            .map(|snapshot| Action::Restore { snapshot })
            .ok_or_else(|| "missing_snapshot".to_string()),
        "set_locale" => Ok(Action::SetLocale {
            locale: locale.unwrap_or_default(),
        }),
        "error" => Err(error.unwrap_or_else(|| "unknown_error".into())),
        other => Err(format!("unknown_action:{other}")),
    }
}

#[no_mangle]
pub extern "system" fn Java_com_example_pdfinsert_PdfRenderFragment_dispatch(
    mut env: JNIEnv,
    _class: JClass,
    input: JString,
) -> jstring {
    let response = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let input_str: String = env
            .get_string(&input)
            .map(|s| s.into())
            .unwrap_or_else(|_| "{}".to_string());

        let command: Command = serde_json::from_str(&input_str).unwrap_or_else(|_| Command {
            action: "error".into(),
            error: Some("invalid_json".into()),
            ..Command::default()
        });

        handle_command(command)
    }));

    let json_value = match response {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => error_ui(&err),
        Err(_) => {
            log_error("panic while handling command");
            error_ui("panic")
        }
    };

    let output_string = json_value.to_string();
    match env.new_string(output_string) {
        Ok(java_str) => java_str.into_raw(),
        Err(_) => {
            let fallback = error_ui("jni_new_string_failed").to_string();
            env.new_string(fallback)
                .map(|s| s.into_raw())
                .unwrap_or(ptr::null_mut())
        }
    }
}

pub(crate) fn handle_command(command: Command) -> Result<Value, String> {
    STATE.with(|cell| {
        let mut state = cell.borrow_mut();
        dispatch(&mut state, command)
    })
}

fn dispatch(state: &mut AppState, command: Command) -> Result<Value, String> {
    let action = match parse_action(command) {
        Ok(action) => action,
        Err(err) => {
            state.last_error = Some(err);
            return Ok(render_and_flush(state));
        }
    };
    state.last_error = None;

    match action {
        Action::Init => {}
        Action::Reset => {
            state.reset_runtime();
        }
        Action::ViewCreated { page_index } => handle_view_created(state, page_index),
        Action::ScreenStart(request) => handle_screen_start(state, request),
        Action::ScreenStop => handle_screen_stop(state),
        Action::Navigate(direction) => handle_navigate(state, direction),
        Action::Save => {
            handle_export(state);
        }
        Action::Snapshot => {
            state.sync_page_index();
            let snap =
                serde_json::to_string(&*state).map_err(|e| format!("snapshot_failed:{e}"))?;
            return Ok(json!({
                "type": "Snapshot",
                "snapshot": snap
            }));
        }
        Action::Restore { snapshot } => match serde_json::from_str::<AppState>(&snapshot) {
            Ok(restored) => {
                update_locale(state, &restored.locale);
                handle_restore_index(state, restored.page_index);
            }
            Err(e) => {
                state.last_error = Some(format!("restore_failed:{e}"));
            }
        },
        Action::SetLocale { locale } => update_locale(state, &locale),
    }

    Ok(render_and_flush(state))
}

/// Renders the screen; a pending toast is delivered exactly once.
fn render_and_flush(state: &mut AppState) -> Value {
    let ui = render_viewer_screen(state);
    state.toast = None;
    ui
}

fn error_ui(message: &str) -> Value {
    json!({
        "type": "Column",
        "padding": 24,
        "children": [
            { "type": "Text", "text": "Error", "size": 18.0 },
            { "type": "Text", "text": message }
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::document::testing;
    use crate::features::export::inspect::{read_pages, rgb};
    use image::{Rgba, RgbaImage};
    use std::fs;
    use std::fs::File;
    use std::os::unix::io::IntoRawFd;
    use std::path::{Path, PathBuf};

    const INK: Rgba<u8> = Rgba([0, 160, 0, 255]);

    fn make_command(action: &str) -> Command {
        Command {
            action: action.into(),
            ..Command::default()
        }
    }

    fn reset_state() {
        handle_command(make_command("reset")).expect("reset command should succeed");
        STATE.with(|cell| {
            let mut state = cell.borrow_mut();
            state.opener = testing::open;
            state.locale = "en".into();
        });
    }

    fn extract_texts(ui: &Value) -> Vec<String> {
        fn walk(node: &Value, acc: &mut Vec<String>) {
            if let Some(text) = node.get("text").and_then(|t| t.as_str()) {
                acc.push(text.to_string());
            }
            if let Some(children) = node.get("children").and_then(|c| c.as_array()) {
                for child in children {
                    walk(child, acc);
                }
            }
        }

        let mut out = Vec::new();
        walk(ui, &mut out);
        out
    }

    fn assert_contains_text(ui: &Value, needle: &str) {
        let texts = extract_texts(ui);
        assert!(
            texts.iter().any(|t| t.contains(needle)),
            "expected UI to contain text with `{needle}`, found: {texts:?}"
        );
    }

    fn find_node<'a>(ui: &'a Value, kind: &str) -> Option<&'a Value> {
        if ui.get("type").and_then(|t| t.as_str()) == Some(kind) {
            return Some(ui);
        }
        ui.get("children")?
            .as_array()?
            .iter()
            .find_map(|child| find_node(child, kind))
    }

    fn button_enabled(ui: &Value, id: &str) -> bool {
        let row = find_node(ui, "Row").expect("controls row");
        row["children"]
            .as_array()
            .unwrap()
            .iter()
            .find(|b| b["id"] == id)
            .and_then(|b| b["enabled"].as_bool())
            .expect("button present")
    }

    struct Sandbox {
        root: tempfile::TempDir,
    }

    impl Sandbox {
        fn new(pages: usize) -> Self {
            let root = tempfile::tempdir().unwrap();
            testing::write_document(&root.path().join("sample.pdf"), &vec![(24, 32); pages]);
            RgbaImage::from_pixel(5, 5, INK)
                .save(root.path().join("ap1025_ic_person.png"))
                .unwrap();
            Self { root }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.root.path().join(name)
        }

        fn start_command(&self) -> Command {
            Command {
                action: "screen_start".into(),
                cache_dir: Some(self.path("cache").to_string_lossy().into_owned()),
                external_files_dir: Some(self.path("DCIM").to_string_lossy().into_owned()),
                pdf_asset: Some(AssetRef::path(self.path("sample.pdf"))),
                overlay_asset: Some(AssetRef::path(self.path("ap1025_ic_person.png"))),
                ..Command::default()
            }
        }

        fn exports(&self) -> Vec<PathBuf> {
            exports_in(&self.path("DCIM").join("pdfinsert"))
        }
    }

    fn exports_in(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .map(|rd| rd.map(|e| e.unwrap().path()).collect())
            .unwrap_or_default();
        files.sort();
        files
    }

    fn env_guard() -> std::sync::MutexGuard<'static, ()> {
        crate::features::storage::test_env_lock()
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    #[test]
    fn start_renders_first_page_and_controls() {
        let _env = env_guard();
        reset_state();
        let sandbox = Sandbox::new(3);
        handle_command(make_command("view_created")).unwrap();
        let ui = handle_command(sandbox.start_command()).unwrap();

        assert_contains_text(&ui, "1 of 3");
        assert!(!button_enabled(&ui, "previous"));
        assert!(button_enabled(&ui, "next"));
        assert!(button_enabled(&ui, "save"));
        assert!(find_node(&ui, "ImageBase64").is_some());
        assert!(sandbox.path("cache").join("sample.pdf").exists());
    }

    #[test]
    fn next_and_previous_walk_the_document() {
        let _env = env_guard();
        reset_state();
        let sandbox = Sandbox::new(3);
        handle_command(sandbox.start_command()).unwrap();

        handle_command(make_command("next_page")).unwrap();
        let ui = handle_command(make_command("next_page")).unwrap();
        assert_contains_text(&ui, "3 of 3");
        assert!(button_enabled(&ui, "previous"));
        assert!(!button_enabled(&ui, "next"));

        // Past the end stays on the last page.
        let ui = handle_command(make_command("next_page")).unwrap();
        assert_contains_text(&ui, "3 of 3");

        let ui = handle_command(make_command("previous_page")).unwrap();
        assert_contains_text(&ui, "2 of 3");
    }

    #[test]
    fn save_writes_stamped_copy_and_toasts_once() {
        let _env = env_guard();
        reset_state();
        let sandbox = Sandbox::new(5);
        handle_command(sandbox.start_command()).unwrap();
        handle_command(make_command("next_page")).unwrap();
        handle_command(make_command("next_page")).unwrap();

        let ui = handle_command(make_command("save")).unwrap();
        let toast = find_node(&ui, "Toast").expect("toast after save");
        assert_eq!(toast["text"], "Image is successfully converted to PDF");

        let files = sandbox.exports();
        assert_eq!(files.len(), 1);
        let name = files[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("PDF_") && name.ends_with(".pdf"), "{name}");

        let pages = read_pages(&files[0]);
        assert_eq!(pages.len(), 5);
        for (i, page) in pages.iter().enumerate() {
            assert_eq!(page.media_box, (24, 32));
            let corner = *page.pixels.get_pixel(23, 31);
            if i == 2 {
                assert_eq!(corner, rgb(INK), "displayed page carries the overlay");
            } else {
                assert_eq!(corner, rgb(testing::page_colour(i as u32)), "page {i}");
            }
        }

        // Toast is gone on the next render; position is unchanged.
        let ui = handle_command(make_command("init")).unwrap();
        assert!(find_node(&ui, "Toast").is_none());
        assert_contains_text(&ui, "3 of 5");
    }

    #[test]
    fn save_failure_is_logged_not_toasted() {
        let _env = env_guard();
        reset_state();
        let sandbox = Sandbox::new(2);
        let mut start = sandbox.start_command();
        fs::write(sandbox.path("not_a_dir"), b"x").unwrap();
        start.external_files_dir = Some(sandbox.path("not_a_dir").to_string_lossy().into_owned());
        handle_command(start).unwrap();

        let ui = handle_command(make_command("save")).unwrap();
        assert!(find_node(&ui, "Toast").is_none());
    }

    #[test]
    fn start_failure_toasts_error() {
        let _env = env_guard();
        reset_state();
        let sandbox = Sandbox::new(2);
        let mut start = sandbox.start_command();
        start.pdf_asset = Some(AssetRef::path(sandbox.path("nope.pdf")));
        let ui = handle_command(start).unwrap();

        let toast = find_node(&ui, "Toast").expect("error toast");
        assert!(toast["text"].as_str().unwrap().starts_with("Error! "));
        assert!(!button_enabled(&ui, "save"));
        assert_contains_text(&ui, "No document open");
    }

    #[test]
    fn undecodable_overlay_still_opens_the_document() {
        let _env = env_guard();
        reset_state();
        let sandbox = Sandbox::new(2);
        fs::write(sandbox.path("ap1025_ic_person.png"), b"not an image").unwrap();
        let ui = handle_command(sandbox.start_command()).unwrap();

        assert!(find_node(&ui, "Toast").is_none());
        assert_contains_text(&ui, "1 of 2");
        assert!(button_enabled(&ui, "save"));
        let images: Vec<&Value> = ui["children"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|c| c["type"] == "ImageBase64")
            .collect();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0]["id"], "page_image");

        // Export still runs, just without a stamp.
        handle_command(make_command("save")).unwrap();
        let files = sandbox.exports();
        assert_eq!(files.len(), 1);
        let pages = read_pages(&files[0]);
        assert_eq!(*pages[0].pixels.get_pixel(23, 31), rgb(testing::page_colour(0)));
    }

    #[test]
    fn descriptors_sent_with_other_commands_are_closed() {
        let _env = env_guard();
        reset_state();
        let (pdf, mut pdf_peer) = testing::socket_asset();
        let (overlay, mut overlay_peer) = testing::socket_asset();
        let mut cmd = make_command("next_page");
        cmd.pdf_asset = Some(pdf);
        cmd.overlay_asset = Some(overlay);
        handle_command(cmd).unwrap();
        assert!(testing::descriptor_closed(&mut pdf_peer));
        assert!(testing::descriptor_closed(&mut overlay_peer));
    }

    #[test]
    fn assets_passed_as_descriptors_are_copied() {
        let _env = env_guard();
        reset_state();
        let sandbox = Sandbox::new(2);
        let mut start = sandbox.start_command();
        let pdf_fd = File::open(sandbox.path("sample.pdf")).unwrap().into_raw_fd();
        let png_fd = File::open(sandbox.path("ap1025_ic_person.png"))
            .unwrap()
            .into_raw_fd();
        start.pdf_asset = Some(AssetRef::Descriptor {
            fd: pdf_fd,
            offset: 0,
            length: None,
        });
        start.overlay_asset = Some(AssetRef::Descriptor {
            fd: png_fd,
            offset: 0,
            length: None,
        });
        let ui = handle_command(start).unwrap();
        assert_contains_text(&ui, "1 of 2");
    }

    #[test]
    fn snapshot_and_restore_round_trip_page_index() {
        let _env = env_guard();
        reset_state();
        let sandbox = Sandbox::new(4);
        handle_command(sandbox.start_command()).unwrap();
        handle_command(make_command("next_page")).unwrap();
        handle_command(make_command("next_page")).unwrap();

        let snap = handle_command(make_command("snapshot")).unwrap();
        assert_eq!(snap["type"], "Snapshot");
        let payload = snap["snapshot"].as_str().unwrap().to_string();

        // Screen is torn down and re-created.
        handle_command(make_command("screen_stop")).unwrap();
        reset_state();
        let mut restore = make_command("restore");
        restore.snapshot = Some(payload.clone());
        handle_command(restore).unwrap();
        let saved: AppState = serde_json::from_str(&payload).unwrap();
        let mut created = make_command("view_created");
        created.page_index = Some(saved.page_index);
        handle_command(created).unwrap();

        let ui = handle_command(sandbox.start_command()).unwrap();
        assert_contains_text(&ui, "3 of 4");
    }

    #[test]
    fn restore_with_open_session_moves_to_saved_page() {
        let _env = env_guard();
        reset_state();
        let sandbox = Sandbox::new(4);
        handle_command(sandbox.start_command()).unwrap();
        let mut restore = make_command("restore");
        restore.snapshot = Some(r#"{"page_index": 3, "locale": "en"}"#.into());
        let ui = handle_command(restore).unwrap();
        assert_contains_text(&ui, "4 of 4");
    }

    #[test]
    fn broken_snapshot_sets_error() {
        let _env = env_guard();
        reset_state();
        let mut restore = make_command("restore");
        restore.snapshot = Some("{not json".into());
        let ui = handle_command(restore).unwrap();
        assert_contains_text(&ui, "restore_failed:");
    }

    #[test]
    fn stop_disables_controls() {
        let _env = env_guard();
        reset_state();
        let sandbox = Sandbox::new(3);
        handle_command(sandbox.start_command()).unwrap();
        let ui = handle_command(make_command("screen_stop")).unwrap();
        assert!(!button_enabled(&ui, "previous"));
        assert!(!button_enabled(&ui, "next"));
        assert!(!button_enabled(&ui, "save"));
        // Commands after stop are harmless.
        handle_command(make_command("next_page")).unwrap();
        handle_command(make_command("save")).unwrap();
        assert!(sandbox.exports().is_empty());
    }

    #[test]
    fn locale_switch_translates_status() {
        let _env = env_guard();
        reset_state();
        let sandbox = Sandbox::new(2);
        handle_command(sandbox.start_command()).unwrap();
        let mut cmd = make_command("set_locale");
        cmd.locale = Some("is-IS".into());
        let ui = handle_command(cmd).unwrap();
        assert_contains_text(&ui, "1 af 2");
        reset_state();
    }

    #[test]
    fn unknown_and_malformed_commands_surface_errors() {
        let _env = env_guard();
        reset_state();
        let ui = handle_command(make_command("teleport")).unwrap();
        assert_contains_text(&ui, "unknown_action:teleport");

        let ui = handle_command(make_command("screen_start")).unwrap();
        assert_contains_text(&ui, "missing_pdf_asset");

        let mut invalid = make_command("error");
        invalid.error = Some("invalid_json".into());
        let ui = handle_command(invalid).unwrap();
        assert_contains_text(&ui, "invalid_json");

        // The error clears on the next good command.
        let ui = handle_command(make_command("init")).unwrap();
        assert!(!extract_texts(&ui).iter().any(|t| t.starts_with("Error:")));
    }

    #[test]
    fn command_json_parses_kotlin_payload() {
        let raw = r#"{
            "action": "screen_start",
            "cache_dir": "/data/user/0/com.example.pdfinsert/cache",
            "external_files_dir": "/storage/emulated/0/Android/data/com.example.pdfinsert/files/DCIM",
            "pdf_asset": {"fd": 71, "offset": 1024, "length": 20480},
            "overlay_asset": {"path": "/tmp/ap1025_ic_person.png"},
            "config": {"export_subfolder": "signed"}
        }"#;
        let cmd: Command = serde_json::from_str(raw).unwrap();
        assert_eq!(cmd.action, "screen_start");
        assert_eq!(
            cmd.pdf_asset,
            Some(AssetRef::Descriptor {
                fd: 71,
                offset: 1024,
                length: Some(20480)
            })
        );
        assert_eq!(cmd.config.unwrap().export_subfolder, "signed");
    }

    #[test]
    fn error_ui_has_message() {
        let ui = error_ui("panic");
        assert_contains_text(&ui, "panic");
    }
}
