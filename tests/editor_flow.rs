use std::{io::Cursor, sync::Mutex};

use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};

use pixshop::{
    ai::{AiCollaborator, AiError, AiResult},
    core::{
        editor::{Editor, EditorError, EditorStatus},
        layers::LayerStack,
    },
    edit::EditRequest,
    layer::LayerKind,
    types::{CropRect, Detection, ImageBlob, Targeting},
};

/// Returns the instruction text as the "image", or a scripted failure.
#[derive(Default)]
struct Scripted {
    fail: Mutex<Option<AiError>>,
    calls: Mutex<Vec<String>>,
}

impl Scripted {
    fn failing(err: AiError) -> Self {
        Self {
            fail: Mutex::new(Some(err)),
            ..Self::default()
        }
    }

    fn answer(&self, call: &str, instruction: String) -> AiResult<ImageBlob> {
        self.calls.lock().expect("lock").push(format!("{call}:{instruction}"));
        if let Some(err) = self.fail.lock().expect("lock").take() {
            return Err(err);
        }
        Ok(ImageBlob::png(instruction.into_bytes()))
    }
}

impl AiCollaborator for Scripted {
    async fn generate_edit(
        &self,
        _image: ImageBlob,
        instruction: String,
        _targeting: Option<Targeting>,
    ) -> AiResult<ImageBlob> {
        self.answer("edit", instruction)
    }

    async fn generate_filter(&self, _image: ImageBlob, instruction: String) -> AiResult<ImageBlob> {
        self.answer("filter", instruction)
    }

    async fn generate_background_change(
        &self,
        _image: ImageBlob,
        instruction: String,
        people_to_exclude: Vec<Detection>,
    ) -> AiResult<ImageBlob> {
        self.answer("background", format!("{instruction}/{}", people_to_exclude.len()))
    }

    async fn detect_faces(&self, _image: ImageBlob) -> AiResult<Vec<Detection>> {
        Ok(Vec::new())
    }

    async fn detect_people(&self, _image: ImageBlob) -> AiResult<Vec<Detection>> {
        Ok(Vec::new())
    }

    async fn generate_suggestions(&self, _image: ImageBlob) -> AiResult<Vec<String>> {
        Ok(Vec::new())
    }
}

fn png(width: u32, height: u32, px: [u8; 4]) -> ImageBlob {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(px)));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
        .expect("encode png");
    ImageBlob::png(out)
}

fn decode(blob: &ImageBlob) -> RgbaImage {
    image::load_from_memory(&blob.bytes).expect("decode").to_rgba8()
}

fn ids(stack: &LayerStack) -> Vec<pixshop::types::LayerId> {
    stack.ids()
}

#[tokio::test]
async fn upload_edit_undo_redo_walks_history() {
    let ai = Scripted::default();
    let mut editor = Editor::new();

    let l0 = editor.upload(png(4, 4, [255, 0, 0, 255])).expect("upload");
    assert_eq!(ids(editor.current().expect("stack")), vec![l0]);
    assert_eq!(editor.history().len(), 1);
    assert_eq!(editor.history().cursor(), Some(0));

    let l1 = editor
        .apply(&ai, EditRequest::generative("smooth skin"))
        .await
        .expect("edit");
    assert_eq!(ids(editor.current().expect("stack")), vec![l0, l1]);
    assert_eq!(editor.history().cursor(), Some(1));
    assert_eq!(editor.history().len(), 2);

    let top = editor.current().and_then(LayerStack::top).expect("top");
    assert_eq!(top.name, "smooth skin");
    assert_eq!(
        top.kind,
        LayerKind::Generative {
            prompt: "smooth skin".to_string()
        }
    );

    assert!(editor.undo().expect("undo"));
    assert_eq!(ids(editor.current().expect("stack")), vec![l0]);
    assert_eq!(editor.history().cursor(), Some(0));

    assert!(editor.redo().expect("redo"));
    assert_eq!(ids(editor.current().expect("stack")), vec![l0, l1]);
    assert_eq!(editor.history().cursor(), Some(1));
}

#[tokio::test]
async fn edit_at_tip_extends_history() {
    let ai = Scripted::default();
    let mut editor = Editor::new();
    let l0 = editor.upload(png(4, 4, [0, 0, 0, 255])).expect("upload");
    let l1 = editor
        .apply(&ai, EditRequest::generative("smooth skin"))
        .await
        .expect("edit");
    editor.undo().expect("undo");
    editor.redo().expect("redo");

    let l2 = editor
        .apply(&ai, EditRequest::generative("add tan"))
        .await
        .expect("edit");

    let entries: Vec<_> = editor.history().entries().iter().map(ids).collect();
    assert_eq!(entries, vec![vec![l0], vec![l0, l1], vec![l0, l1, l2]]);
    assert_eq!(editor.history().cursor(), Some(2));
    assert!(!editor.redo().expect("redo at tip"));
    assert_eq!(editor.history().cursor(), Some(2));
}

#[tokio::test]
async fn commit_after_undo_truncates_redo_future() {
    let ai = Scripted::default();
    let mut editor = Editor::new();
    let l0 = editor.upload(png(2, 2, [0, 0, 0, 255])).expect("upload");
    editor
        .apply(&ai, EditRequest::generative("one"))
        .await
        .expect("edit");
    editor
        .apply(&ai, EditRequest::generative("two"))
        .await
        .expect("edit");
    editor.undo().expect("undo");
    editor.undo().expect("undo");

    let l3 = editor
        .apply(&ai, EditRequest::generative("three"))
        .await
        .expect("edit");
    assert_eq!(editor.history().len(), 2);
    assert_eq!(ids(editor.current().expect("stack")), vec![l0, l3]);
    assert!(!editor.can_redo());
}

#[tokio::test]
async fn visibility_toggle_is_a_history_entry() {
    let ai = Scripted::default();
    let mut editor = Editor::new();
    editor.upload(png(2, 2, [0, 0, 0, 255])).expect("upload");
    let l1 = editor
        .apply(&ai, EditRequest::generative("smooth skin"))
        .await
        .expect("edit");

    editor.toggle_visibility(l1).expect("toggle");
    assert_eq!(editor.history().len(), 3);
    let hidden = editor.current().and_then(|s| s.get(l1)).expect("layer");
    assert!(!hidden.is_visible);

    editor.undo().expect("undo");
    let shown = editor.current().and_then(|s| s.get(l1)).expect("layer survives undo");
    assert!(shown.is_visible);
}

#[tokio::test]
async fn opacity_and_reorder_commit_new_entries() {
    let ai = Scripted::default();
    let mut editor = Editor::new();
    let l0 = editor.upload(png(2, 2, [0, 0, 0, 255])).expect("upload");
    let l1 = editor.apply(&ai, EditRequest::generative("a")).await.expect("a");
    let l2 = editor.apply(&ai, EditRequest::generative("b")).await.expect("b");

    editor.set_opacity(l1, 40).expect("opacity");
    assert_eq!(editor.current().and_then(|s| s.get(l1)).map(|l| l.opacity), Some(40));
    editor.set_opacity(l1, 250).expect("opacity");
    assert_eq!(editor.current().and_then(|s| s.get(l1)).map(|l| l.opacity), Some(100));
    // same clamped value still lands as its own entry
    let len = editor.history().len();
    editor.set_opacity(l1, 100).expect("opacity");
    assert_eq!(editor.history().len(), len + 1);

    editor.set_opacity(l1, -4).expect("opacity");
    assert_eq!(editor.current().and_then(|s| s.get(l1)).map(|l| l.opacity), Some(0));

    editor.reorder_layers(2, 1).expect("reorder");
    assert_eq!(ids(editor.current().expect("stack")), vec![l0, l2, l1]);

    let before = editor.history().len();
    let err = editor.reorder_layers(0, 9).unwrap_err();
    assert_eq!(err, EditorError::IndexOutOfRange { from: 0, to: 9, len: 3 });
    assert_eq!(editor.history().len(), before);
}

#[tokio::test]
async fn reset_to_original_keeps_only_the_upload() {
    let ai = Scripted::default();
    let mut editor = Editor::new();
    let original = png(3, 3, [9, 9, 9, 255]);
    let l0 = editor.upload(original.clone()).expect("upload");
    for prompt in ["a", "b", "c", "d"] {
        editor.apply(&ai, EditRequest::generative(prompt)).await.expect("edit");
    }

    editor.reset_to_original().expect("reset");
    let stack = editor.current().expect("stack");
    assert_eq!(stack.len(), 1);
    let base = stack.base().expect("base");
    assert_eq!(base.id, l0);
    assert_eq!(base.image, original);
    assert_eq!(base.name, "Original Image");

    editor.reset_to_original().expect("second reset");
    assert_eq!(editor.history().len(), 7);
    assert_eq!(editor.current().map(LayerStack::len), Some(1));
    assert!(editor.undo().expect("undo second reset"));
    assert!(editor.undo().expect("undo first reset"));
    assert_eq!(editor.current().map(LayerStack::len), Some(5));
}

#[tokio::test]
async fn reset_after_undo_drops_the_redo_future() {
    let ai = Scripted::default();
    let mut editor = Editor::new();
    let l0 = editor.upload(png(2, 2, [0, 0, 0, 255])).expect("upload");
    editor
        .apply(&ai, EditRequest::generative("smooth skin"))
        .await
        .expect("edit");
    assert!(editor.undo().expect("undo"));
    assert!(editor.can_redo());

    editor.reset_to_original().expect("reset");
    assert_eq!(editor.history().len(), 2);
    assert_eq!(editor.history().cursor(), Some(1));
    assert!(!editor.can_redo());
    assert_eq!(ids(editor.current().expect("stack")), vec![l0]);
}

#[tokio::test]
async fn no_op_transforms_still_commit_and_drop_the_redo_future() {
    let ai = Scripted::default();
    let mut editor = Editor::new();
    let l0 = editor.upload(png(2, 2, [0, 0, 0, 255])).expect("upload");
    let l1 = editor
        .apply(&ai, EditRequest::generative("add tan"))
        .await
        .expect("edit");

    editor.undo().expect("undo");
    editor
        .toggle_visibility(pixshop::types::LayerId::new_v4())
        .expect("unknown id");
    assert_eq!(editor.history().len(), 2);
    assert_eq!(editor.history().cursor(), Some(1));
    assert!(!editor.can_redo());
    assert_eq!(editor.history().entries()[1], editor.history().entries()[0]);

    editor.redo().expect("redo");
    assert_eq!(ids(editor.current().expect("stack")), vec![l0]);

    let l2 = editor
        .apply(&ai, EditRequest::generative("warmer"))
        .await
        .expect("edit");
    editor.undo().expect("undo");
    editor.reorder_layers(0, 0).expect("reorder in place");
    assert_eq!(editor.history().len(), 3);
    assert!(!editor.can_redo());
    assert!(!ids(editor.current().expect("stack")).contains(&l1));
    assert!(!ids(editor.current().expect("stack")).contains(&l2));
}

#[tokio::test]
async fn policy_block_leaves_history_untouched() {
    let ai = Scripted::failing(AiError::PolicyBlocked {
        reason: "SAFETY".to_string(),
    });
    let mut editor = Editor::new();
    let l0 = editor.upload(png(2, 2, [0, 0, 0, 255])).expect("upload");
    let before = editor.history().clone();

    let err = editor
        .apply(&ai, EditRequest::generative("smooth skin"))
        .await
        .unwrap_err();
    assert!(matches!(err, EditorError::AiPolicyBlocked(_)));
    assert_eq!(editor.history(), &before);
    assert_eq!(ids(editor.current().expect("stack")), vec![l0]);
    assert_eq!(editor.status(), EditorStatus::Idle);

    let message = editor.last_error().expect("error surfaced");
    assert!(message.starts_with("Failed to generate the image."), "{message}");
    assert!(message.contains("SAFETY"), "{message}");

    editor.dismiss_error();
    assert_eq!(editor.last_error(), None);
}

#[tokio::test]
async fn blank_instruction_and_missing_image_never_reach_the_collaborator() {
    let ai = Scripted::default();
    let mut editor = Editor::new();

    let err = editor
        .apply(&ai, EditRequest::generative("add a hat"))
        .await
        .unwrap_err();
    assert_eq!(err, EditorError::NoImageLoaded);
    assert_eq!(editor.last_error(), Some("No image loaded to edit."));

    editor.upload(png(2, 2, [0, 0, 0, 255])).expect("upload");
    let err = editor
        .apply(
            &ai,
            EditRequest::Filter {
                prompt: " \t".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err, EditorError::EmptyInstruction);
    assert!(!editor.is_busy());
    assert_eq!(editor.history().len(), 1);
    assert!(ai.calls.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn requests_route_to_matching_calls_and_name_layers() {
    let ai = Scripted::default();
    let mut editor = Editor::new();
    editor.upload(png(2, 2, [0, 0, 0, 255])).expect("upload");

    editor
        .apply(
            &ai,
            EditRequest::Filter {
                prompt: "a moody cinematic teal and orange look".to_string(),
            },
        )
        .await
        .expect("filter");
    let top = editor.current().and_then(LayerStack::top).expect("top");
    assert_eq!(top.name, "Filter: a moody cinematic te...");

    editor
        .apply(
            &ai,
            EditRequest::Background {
                prompt: "beach".to_string(),
                exclude: vec![Detection {
                    id: 1,
                    bbox: CropRect::new(0, 0, 1, 1),
                }],
            },
        )
        .await
        .expect("background");
    editor
        .apply(
            &ai,
            EditRequest::Adjustment {
                prompt: "warmer".to_string(),
            },
        )
        .await
        .expect("adjustment");

    let calls = ai.calls.lock().expect("lock").clone();
    assert_eq!(
        calls,
        vec![
            "filter:a moody cinematic teal and orange look".to_string(),
            "background:beach/1".to_string(),
            "background:warmer/0".to_string(),
        ]
    );
}

#[test]
fn busy_editor_rejects_mutations_and_stale_tickets_are_dropped() {
    let mut editor = Editor::new();
    let l0 = editor.upload(png(2, 2, [0, 0, 0, 255])).expect("upload");

    let first = editor
        .begin_edit(EditRequest::generative("first"))
        .expect("begin");
    assert_eq!(editor.status(), EditorStatus::Busy { ticket: first.ticket });
    assert_eq!(editor.begin_edit(EditRequest::generative("again")).unwrap_err(), EditorError::Busy);
    assert_eq!(editor.undo().unwrap_err(), EditorError::Busy);
    assert_eq!(editor.toggle_visibility(l0).unwrap_err(), EditorError::Busy);
    assert_eq!(editor.upload(png(1, 1, [0, 0, 0, 255])).unwrap_err(), EditorError::Busy);

    assert!(editor.cancel());
    let late = editor.complete(first.ticket, Ok(ImageBlob::png(vec![1])));
    assert_eq!(late, Err(EditorError::Cancelled));
    assert_eq!(editor.history().len(), 1);

    let second = editor
        .begin_edit(EditRequest::generative("second"))
        .expect("begin");
    assert!(second.ticket > first.ticket);
    let id = editor
        .complete(second.ticket, Ok(ImageBlob::png(vec![2])))
        .expect("complete");
    assert_eq!(editor.current().and_then(LayerStack::top).map(|l| l.id), Some(id));
}

#[test]
fn crop_appends_a_cropped_layer() {
    let mut editor = Editor::new();
    editor.upload(png(10, 8, [0, 255, 0, 255])).expect("upload");

    editor.crop(CropRect::new(2, 2, 4, 3)).expect("crop");
    let top = editor.current().and_then(LayerStack::top).expect("top");
    assert_eq!(top.name, "Crop");
    assert_eq!(decode(&top.image).dimensions(), (4, 3));

    let before = editor.history().len();
    let err = editor.crop(CropRect::new(50, 50, 4, 4)).unwrap_err();
    assert!(matches!(err, EditorError::Raster(_)));
    assert_eq!(editor.history().len(), before);
    assert!(editor.last_error().is_some_and(|m| m.starts_with("Failed to crop the image.")));
}

#[test]
fn export_flattens_visible_layers_without_touching_history() {
    let mut editor = Editor::new();
    editor.upload(png(2, 2, [255, 0, 0, 255])).expect("upload");
    let pending = editor
        .begin_edit(EditRequest::generative("blue"))
        .expect("begin");
    let blue = editor
        .complete(pending.ticket, Ok(png(2, 2, [0, 0, 255, 255])))
        .expect("complete");

    let out = decode(&editor.export().expect("export"));
    assert_eq!(out.get_pixel(0, 0), &Rgba([0, 0, 255, 255]));

    editor.toggle_visibility(blue).expect("hide");
    let len = editor.history().len();
    let out = decode(&editor.export().expect("export"));
    assert_eq!(out.get_pixel(1, 1), &Rgba([255, 0, 0, 255]));
    assert_eq!(editor.history().len(), len);

    editor.clear().expect("clear");
    assert_eq!(editor.export().unwrap_err(), EditorError::NoImageLoaded);
}
