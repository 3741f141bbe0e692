use std::{
    collections::HashMap,
    mem,
    path::PathBuf,
    process,
    sync::Arc,
    time::Instant,
};

use anyhow::Context;
use bytemuck::NoUninit;
use image::RgbaImage;
use wgpu::{
    util::{DeviceExt, TextureDataOrder},
    Adapter, Backends, BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout,
    BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingResource, BindingType, BlendState,
    Buffer, BufferBindingType, BufferDescriptor, BufferUsages, Color, ColorTargetState,
    ColorWrites, CommandEncoder, Device, DeviceDescriptor, Extent3d, FilterMode, FragmentState,
    InstanceDescriptor, LoadOp, MemoryHints, MultisampleState, Operations, Origin3d,
    PipelineCompilationOptions, PipelineLayoutDescriptor, PrimitiveState, PrimitiveTopology,
    Queue, RenderPass, RenderPassColorAttachment, RenderPassDescriptor, RenderPipeline,
    RenderPipelineDescriptor, RequestAdapterOptions, SamplerBindingType, SamplerDescriptor,
    ShaderModuleDescriptor, ShaderSource, ShaderStages, Surface, SurfaceError, SurfaceTarget,
    TexelCopyBufferLayout, TexelCopyTextureInfo, Texture, TextureAspect, TextureDescriptor,
    TextureDimension, TextureFormat, TextureSampleType, TextureUsages, TextureViewDimension,
    VertexState,
};
use winit::{
    application::ApplicationHandler,
    dpi::{PhysicalPosition, PhysicalSize},
    event::{ElementState, KeyEvent, MouseButton, Touch, TouchPhase, WindowEvent},
    event_loop::ActiveEventLoop,
    keyboard::{Key, NamedKey},
    window::{Window, WindowId},
};

use crate::{
    board::Board,
    cmd::Cmd,
    config::{Config, Mode},
    export,
    gesture::{Hand, INDEX_TIP},
    math::{vec2, Vec2f, Vec2u},
    pointer::{Device as PointerDevice, PointerEvent, PointerKind, PRIMARY_BUTTON},
    stroke::{self, Brush, Tool},
    toolbar::{self, Action, Rect, Toolbar, ToolbarLayout},
};

/// Brush colors selectable with the number keys.
const PALETTE: [&str; 6] = ["#22d3ee", "#f472b6", "#a3e635", "#facc15", "#f97316", "#ffffff"];

const BACKGROUND: Color = Color {
    r: 0.012,
    g: 0.018,
    b: 0.035,
    a: 1.0,
};

pub struct App {
    instance: wgpu::Instance,
    win: Option<Win>,
    board: Board,
    toolbar: Toolbar,
    bind: HashMap<String, Action>,
    /// Directory saved images are written to.
    save_dir: PathBuf,
    initial_size: PhysicalSize<u32>,

    /// Latest frame from the hand tracker.
    hand: Option<Hand>,
    /// Mouse position, while it is over the window.
    pointer: Option<Vec2f>,
    /// Pressed mouse buttons, one bit per button.
    buttons: u32,
}

struct Gpu {
    adapter: Adapter,
    device: Device,
    queue: Queue,
    /// Format of the window surface.
    format: TextureFormat,

    render_pipeline: RenderPipeline,
    sampler_bg: BindGroup,

    texture_bgl: BindGroupLayout,
    uniforms_bgl: BindGroupLayout,
    instances_bgl: BindGroupLayout,
}

impl Gpu {
    fn new(
        instance: &wgpu::Instance,
        surface: &Surface<'_>,
        width: u32,
        height: u32,
    ) -> anyhow::Result<Self> {
        let adapter = pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            compatible_surface: Some(surface),
            ..Default::default()
        }))
        .context("failed to find a supported graphics adapter")?;

        let (device, queue) = pollster::block_on(adapter.request_device(&DeviceDescriptor {
            memory_hints: MemoryHints::MemoryUsage,
            ..Default::default()
        }))?;

        let config = surface
            .get_default_config(&adapter, width, height)
            .context("adapter does not support surface")?;

        // Shader
        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("shader"),
            source: ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        });

        // BGLs
        let sampler_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("sampler"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                count: None,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Sampler(SamplerBindingType::Filtering),
            }],
        });
        let texture_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("texture"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                count: None,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: true },
                    view_dimension: TextureViewDimension::D2,
                    multisampled: false,
                },
            }],
        });
        let uniforms_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("uniforms"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                count: None,
                visibility: ShaderStages::VERTEX,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
            }],
        });
        let instances_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("instances"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                count: None,
                visibility: ShaderStages::VERTEX,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
            }],
        });

        // Pipeline.
        let render_pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("quad_pipeline"),
            layout: Some(&device.create_pipeline_layout(&PipelineLayoutDescriptor {
                label: Some("quad_pipeline"),
                bind_group_layouts: &[&sampler_bgl, &texture_bgl, &uniforms_bgl, &instances_bgl],
                ..Default::default()
            })),
            vertex: VertexState {
                module: &shader,
                entry_point: Some("vertex"),
                compilation_options: PipelineCompilationOptions::default(),
                buffers: &[],
            },
            primitive: PrimitiveState {
                topology: PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: MultisampleState::default(),
            fragment: Some(FragmentState {
                module: &shader,
                entry_point: Some("fragment"),
                compilation_options: PipelineCompilationOptions::default(),
                targets: &[Some(ColorTargetState {
                    format: config.format,
                    blend: Some(BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                    write_mask: ColorWrites::all(),
                })],
            }),
            multiview: None,
            cache: None,
        });
        let sampler = device.create_sampler(&SamplerDescriptor {
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            ..Default::default()
        });
        let sampler_bg = device.create_bind_group(&BindGroupDescriptor {
            label: Some("sampler"),
            layout: &sampler_bgl,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: BindingResource::Sampler(&sampler),
            }],
        });

        Ok(Gpu {
            adapter,
            device,
            queue,
            format: config.format,
            render_pipeline,
            sampler_bg,
            texture_bgl,
            uniforms_bgl,
            instances_bgl,
        })
    }
}

struct Win {
    window: Arc<Window>,
    surface: Surface<'static>,
    gpu: Gpu,

    /// Textured quad showing the rendered strokes.
    canvas: Drawable,
    /// Toolbar, cursor and hand landmarks.
    overlay: Drawable,
    /// Stroke list revision last copied into `canvas`.
    uploaded_revision: Option<u64>,
}

impl Win {
    fn recreate_swapchain(&self) -> anyhow::Result<()> {
        let res = self.window.inner_size();
        if res.width == 0 || res.height == 0 {
            return Ok(());
        }

        let config = self
            .surface
            .get_default_config(&self.gpu.adapter, res.width, res.height)
            .context("adapter does not support surface")?;

        log::debug!(
            "configuring window surface for {}x{} (format: {:?}, present mode: {:?}, alpha mode: {:?})",
            res.width,
            res.height,
            config.format,
            config.present_mode,
            config.alpha_mode,
        );

        self.surface.configure(&self.gpu.device, &config);
        Ok(())
    }

    /// Copies the board's canvas to the GPU if it changed since the last upload.
    fn sync_canvas(&mut self, board: &Board) {
        let image = board.canvas().image();
        let size = self.canvas.texture.size();
        if (size.width, size.height) != image.dimensions() {
            self.canvas = Drawable::canvas(&self.gpu, image.width(), image.height());
            self.uploaded_revision = None;
        }
        if self.uploaded_revision == board.rendered_revision() {
            return;
        }

        self.canvas.upload(&self.gpu, image);
        self.uploaded_revision = board.rendered_revision();
        self.canvas.set_instances(
            &self.gpu,
            &[Quad::image(
                Vec2f::zero(),
                vec2(image.width() as f32, image.height() as f32),
            )],
        );
    }

    fn redraw(&mut self, board: &Board, overlay: &[Quad]) -> anyhow::Result<()> {
        let st = match self.surface.get_current_texture() {
            Ok(st) => st,
            Err(err @ (SurfaceError::Outdated | SurfaceError::Lost)) => {
                log::debug!("surface error: {}", err);
                self.recreate_swapchain()?;
                self.surface
                    .get_current_texture()
                    .context("failed to acquire next frame after recreating swapchain")?
            }
            Err(e) => return Err(e).context("failed to acquire frame"),
        };

        self.sync_canvas(board);
        self.overlay.set_instances(&self.gpu, overlay);

        let mut enc = self.gpu.device.create_command_encoder(&Default::default());

        let mut pass = Pass::new(&self.gpu, &mut enc, &st.texture, BACKGROUND);
        self.canvas.draw(&mut pass);
        self.overlay.draw(&mut pass);
        drop(pass);

        self.gpu.queue.submit([enc.finish()]);
        self.window.pre_present_notify();
        st.present();
        Ok(())
    }
}

impl App {
    pub fn new(mut config: Config) -> anyhow::Result<Self> {
        let board = Board::new(&config);
        Ok(Self {
            instance: wgpu::Instance::new(&InstanceDescriptor {
                backends: Backends::PRIMARY,
                ..Default::default()
            }),
            win: None,
            toolbar: Toolbar::new(board.viewport()),
            board,
            bind: mem::take(&mut config.bind),
            save_dir: std::env::current_dir()?,
            initial_size: PhysicalSize::new(config.width, config.height),
            hand: None,
            pointer: None,
            buttons: 0,
        })
    }

    fn create_win(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<Win> {
        let window = Arc::new(
            event_loop.create_window(
                Window::default_attributes()
                    .with_inner_size(self.initial_size)
                    .with_title("Pinchboard"),
            )?,
        );

        let surface = self
            .instance
            .create_surface(SurfaceTarget::from(window.clone()))?;
        let res = window.inner_size();
        let gpu = Gpu::new(&self.instance, &surface, res.width, res.height)?;

        log::debug!(
            "creating canvas at {}x{}, format={:?}",
            res.width,
            res.height,
            gpu.format
        );
        let canvas = Drawable::canvas(&gpu, res.width.max(1), res.height.max(1));
        let overlay = Drawable::from_texture(
            &gpu,
            gpu.device.create_texture_with_data(
                &gpu.queue,
                &TextureDescriptor {
                    label: Some("white"),
                    size: Extent3d {
                        width: 1,
                        height: 1,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: TextureDimension::D2,
                    format: TextureFormat::Rgba8UnormSrgb,
                    usage: TextureUsages::TEXTURE_BINDING,
                    view_formats: &[],
                },
                TextureDataOrder::LayerMajor,
                &[0xff; 4],
            ),
        );

        let win = Win {
            window,
            surface,
            gpu,
            canvas,
            overlay,
            uploaded_revision: None,
        };
        win.recreate_swapchain()?;
        Ok(win)
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.board.resize(size.width, size.height);
        self.toolbar.viewport = vec2(size.width as f32, size.height as f32);
    }

    /// Writes the canvas to disk if a save was requested.
    fn flush_save(&mut self) {
        let Some(image) = self.board.take_save_request() else {
            return;
        };
        log::debug!(
            "saving canvas with {} stroke(s)",
            self.board.store().strokes().len()
        );
        if let Err(e) = export::save_png(&image, &self.save_dir) {
            log::error!("failed to save canvas: {e:#}");
        }
    }

    fn on_mouse_button(&mut self, state: ElementState, button: MouseButton) {
        let Some((index, bit)) = mouse_button(button) else {
            return;
        };
        let Some(position) = self.pointer else {
            return;
        };

        let kind = match state {
            ElementState::Pressed => {
                self.buttons |= bit;
                if bit == PRIMARY_BUTTON && self.click_toolbar(position) {
                    return;
                }
                PointerKind::Down
            }
            ElementState::Released => {
                self.buttons &= !bit;
                PointerKind::Up
            }
        };
        self.board.on_pointer(&PointerEvent {
            kind,
            device: PointerDevice::Mouse,
            button: index,
            buttons: self.buttons,
            position,
        });
    }

    /// Returns whether the click landed on the toolbar.
    fn click_toolbar(&mut self, position: Vec2f) -> bool {
        if self.toolbar.toggle_rect().contains(position) {
            self.toolbar.expanded = !self.toolbar.expanded;
            return true;
        }
        match toolbar::hit_test(&self.toolbar, position) {
            Some(action) => {
                self.board.apply(action);
                true
            }
            None => false,
        }
    }

    fn on_touch(&mut self, touch: Touch) {
        let position = physical(touch.location);
        let (kind, buttons) = match touch.phase {
            TouchPhase::Started => {
                if self.click_toolbar(position) {
                    return;
                }
                (PointerKind::Down, PRIMARY_BUTTON)
            }
            TouchPhase::Moved => (PointerKind::Move, PRIMARY_BUTTON),
            TouchPhase::Ended => (PointerKind::Up, 0),
            TouchPhase::Cancelled => (PointerKind::Leave, 0),
        };
        self.board.on_pointer(&PointerEvent {
            kind,
            device: PointerDevice::Touch,
            button: 0,
            buttons,
            position,
        });
    }

    fn on_key(&mut self, event_loop: &ActiveEventLoop, event: KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        match &event.logical_key {
            Key::Named(NamedKey::Escape) => event_loop.exit(),
            Key::Character(c) => {
                if let Some(&action) = self.bind.get(c.as_str()) {
                    self.board.apply(action);
                    return;
                }
                let res = match c.as_str() {
                    "+" | "=" => self.board.set_thickness(
                        (self.board.brush().thickness + 1.0).min(*Brush::THICKNESS.end()),
                    ),
                    "-" => self.board.set_thickness(
                        (self.board.brush().thickness - 1.0).max(*Brush::THICKNESS.start()),
                    ),
                    digit => match digit.parse::<usize>() {
                        Ok(n @ 1..=9) => match PALETTE.get(n - 1) {
                            Some(color) => self.board.set_color(color),
                            None => Ok(()),
                        },
                        _ => Ok(()),
                    },
                };
                if let Err(e) = res {
                    log::warn!("{e}");
                }
            }
            _ => {}
        }
    }
}

impl ApplicationHandler<Cmd> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.win.is_none() {
            let win = match self.create_win(event_loop) {
                Ok(win) => win,
                Err(e) => {
                    eprintln!("could not create window: {e:#}");
                    process::exit(1);
                }
            };
            self.resize(win.window.inner_size());
            self.win = Some(win);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.win.is_none() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::RedrawRequested => {
                let quads = overlay(
                    &self.board,
                    &self.toolbar,
                    self.hand.as_ref(),
                    self.pointer,
                );
                if let Some(win) = &mut self.win {
                    if let Err(e) = win.redraw(&self.board, &quads) {
                        log::error!("{e:#}");
                    }
                }
                return;
            }
            WindowEvent::Resized(size) => {
                if let Some(win) = &self.win {
                    if let Err(e) = win.recreate_swapchain() {
                        log::error!("{e:#}");
                    }
                }
                self.resize(size);
            }
            WindowEvent::CursorMoved { position, .. } => {
                let position = physical(position);
                self.pointer = Some(position);
                self.board.on_pointer(&PointerEvent {
                    kind: PointerKind::Move,
                    device: PointerDevice::Mouse,
                    button: 0,
                    buttons: self.buttons,
                    position,
                });
            }
            WindowEvent::CursorLeft { .. } => {
                if let Some(position) = self.pointer.take() {
                    self.board.on_pointer(&PointerEvent {
                        kind: PointerKind::Leave,
                        device: PointerDevice::Mouse,
                        button: 0,
                        buttons: self.buttons,
                        position,
                    });
                }
            }
            WindowEvent::MouseInput { state, button, .. } => self.on_mouse_button(state, button),
            WindowEvent::Touch(touch) => self.on_touch(touch),
            WindowEvent::KeyboardInput { event, .. } => self.on_key(event_loop, event),
            _ => return,
        }

        self.flush_save();
        if let Some(win) = &self.win {
            win.window.request_redraw();
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: Cmd) {
        match event {
            Cmd::Frame(hand) => {
                self.board
                    .on_landmarks(hand.as_ref(), &self.toolbar, Instant::now());
                self.hand = hand;
            }
            Cmd::DetectorFailed { reason } => {
                log::error!("hand tracking stopped: {reason}");
                self.board.on_tracking_stopped();
                self.hand = None;
            }
        }

        self.flush_save();
        if let Some(win) = &self.win {
            win.window.request_redraw();
        }
    }
}

fn physical(position: PhysicalPosition<f64>) -> Vec2f {
    vec2(position.x as f32, position.y as f32)
}

/// Maps a mouse button to its pointer button index and its bit in the pressed-buttons mask.
fn mouse_button(button: MouseButton) -> Option<(u16, u32)> {
    match button {
        MouseButton::Left => Some((0, PRIMARY_BUTTON)),
        MouseButton::Middle => Some((1, 4)),
        MouseButton::Right => Some((2, 2)),
        MouseButton::Back => Some((3, 8)),
        MouseButton::Forward => Some((4, 16)),
        MouseButton::Other(_) => None,
    }
}

/// Straight-alpha color in linear space.
fn rgba(color: stroke::Color, alpha: f32) -> [f32; 4] {
    let [r, g, b] = color.0.map(|c| (c as f32 / 255.0).powf(2.2));
    [r, g, b, alpha]
}

fn hex(rgb: u32) -> stroke::Color {
    let [_, r, g, b] = rgb.to_be_bytes();
    stroke::Color([r, g, b])
}

fn icon_color(action: Action, board: &Board) -> stroke::Color {
    match action {
        Action::Pen => board.brush().color,
        Action::Neon => hex(0xf0abfc),
        Action::Eraser => hex(0xf5f5f5),
        Action::Undo => hex(0xfbbf24),
        Action::Redo => hex(0x34d399),
        Action::Clear => hex(0xf87171),
        Action::Save => hex(0x60a5fa),
        Action::Mode => match board.mode() {
            Mode::Camera => hex(0xa78bfa),
            Mode::Mouse => hex(0x94a3b8),
        },
    }
}

fn inset(rect: Rect, by: f32) -> (Vec2f, Vec2f) {
    (
        rect.origin() + vec2(by, by),
        rect.size() - vec2(2.0 * by, 2.0 * by),
    )
}

/// Everything drawn on top of the canvas.
fn overlay(
    board: &Board,
    toolbar: &Toolbar,
    hand: Option<&Hand>,
    pointer: Option<Vec2f>,
) -> Vec<Quad> {
    let mut quads = Vec::new();
    let hovered = match board.mode() {
        Mode::Camera => board.hovered_tool(),
        Mode::Mouse => pointer.and_then(|p| toolbar::hit_test(toolbar, p)),
    };

    let toggle = toolbar.toggle_rect();
    quads.push(Quad::rect(toggle.origin(), toggle.size(), rgba(hex(0x334155), 0.9)));
    let (pos, size) = inset(toggle, 14.0);
    quads.push(Quad::rect(pos, size, rgba(hex(0xcbd5e1), 1.0)));

    for button in toolbar.buttons() {
        let active = button.action.tool().is_some_and(|tool| tool == board.brush().tool);
        if active || hovered == Some(button.action) {
            let color = if active { hex(0x22d3ee) } else { hex(0xfde68a) };
            let (pos, size) = inset(button.rect, -3.0);
            quads.push(Quad::rect(pos, size, rgba(color, 1.0)));
        }
        let rect = button.rect;
        quads.push(Quad::rect(rect.origin(), rect.size(), rgba(hex(0x1e293b), 0.9)));
        let (pos, size) = inset(rect, 10.0);
        quads.push(Quad::disc(
            pos + size / 2.0,
            size.x(),
            rgba(icon_color(button.action, board), 1.0),
        ));
    }

    let brush = board.brush();
    match board.mode() {
        Mode::Camera => {
            if let Some(hand) = hand {
                let viewport = board.viewport();
                for i in 0..hand.landmarks().len() {
                    let p = hand.canvas_position(i, viewport);
                    if i == INDEX_TIP {
                        quads.push(Quad::disc(p, 16.0, rgba(brush.color, 1.0)));
                    } else {
                        quads.push(Quad::disc(p, 8.0, rgba(hex(0xffffff), 0.7)));
                    }
                }
            }
            if let Some(cursor) = board.gesture_cursor() {
                let color = if board.is_pinching() {
                    rgba(brush.color, 0.6)
                } else {
                    rgba(hex(0xffffff), 0.35)
                };
                quads.push(Quad::disc(cursor, 28.0, color));
            }
        }
        Mode::Mouse => {
            if let Some(p) = pointer {
                let color = match brush.tool {
                    Tool::Eraser => rgba(hex(0xffffff), 0.5),
                    _ => rgba(brush.color, 0.8),
                };
                quads.push(Quad::disc(p, brush.thickness.max(4.0), color));
            }
        }
    }

    quads
}

#[derive(Clone, Copy, NoUninit)]
#[repr(C)]
struct Uniforms {
    render_target_size: Vec2u,
}

/// One instanced quad; the layout matches `Quad` in shader.wgsl.
#[derive(Debug, Clone, Copy, PartialEq, NoUninit)]
#[repr(C)]
struct Quad {
    /// Top-left corner in pixel coordinates.
    pos: Vec2f,
    size: Vec2f,
    /// Straight alpha, multiplied with the texture for `KIND_IMAGE`.
    color: [f32; 4],
    kind: u32,
    _padding: [u32; 3],
}

const KIND_RECT: u32 = 0;
const KIND_DISC: u32 = 1;
const KIND_IMAGE: u32 = 2;

impl Quad {
    fn rect(pos: Vec2f, size: Vec2f, color: [f32; 4]) -> Self {
        Self {
            pos,
            size,
            color,
            kind: KIND_RECT,
            _padding: [0; 3],
        }
    }

    fn disc(center: Vec2f, diameter: f32, color: [f32; 4]) -> Self {
        let size = vec2(diameter, diameter);
        Self {
            kind: KIND_DISC,
            ..Self::rect(center - size / 2.0, size, color)
        }
    }

    fn image(pos: Vec2f, size: Vec2f) -> Self {
        Self {
            kind: KIND_IMAGE,
            ..Self::rect(pos, size, [1.0; 4])
        }
    }
}

struct Pass<'a> {
    gpu: &'a Gpu,
    pass: RenderPass<'a>,
    render_target_size: Vec2u,
}

impl<'a> Pass<'a> {
    fn new(gpu: &'a Gpu, enc: &'a mut CommandEncoder, target: &Texture, clear: Color) -> Self {
        let pass = enc.begin_render_pass(&RenderPassDescriptor {
            color_attachments: &[Some(RenderPassColorAttachment {
                view: &target.create_view(&Default::default()),
                depth_slice: None,
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Clear(clear),
                    ..Default::default()
                },
            })],
            ..Default::default()
        });

        Self {
            gpu,
            pass,
            render_target_size: vec2(target.width(), target.height()),
        }
    }
}

struct Drawable {
    texture: Texture,
    uniform_buf: Buffer,
    instance_buf: Buffer,
    texture_bg: BindGroup,
    uniforms_bg: BindGroup,
    instances_bg: BindGroup,
    instance_count: u32,
}

impl Drawable {
    /// An sRGB texture the CPU canvas is copied into.
    fn canvas(gpu: &Gpu, width: u32, height: u32) -> Self {
        let texture = gpu.device.create_texture(&TextureDescriptor {
            label: Some("canvas"),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8UnormSrgb,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });
        Self::from_texture(gpu, texture)
    }

    fn from_texture(gpu: &Gpu, texture: Texture) -> Self {
        let uniform_buf = gpu.device.create_buffer(&BufferDescriptor {
            label: None,
            size: mem::size_of::<Uniforms>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let instance_buf = gpu.device.create_buffer(&BufferDescriptor {
            label: None,
            size: mem::size_of::<Quad>() as u64, // 1 instance preallocated
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let texture_bg = gpu.device.create_bind_group(&BindGroupDescriptor {
            label: None,
            layout: &gpu.texture_bgl,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: BindingResource::TextureView(&texture.create_view(&Default::default())),
            }],
        });
        let uniforms_bg = gpu.device.create_bind_group(&BindGroupDescriptor {
            label: None,
            layout: &gpu.uniforms_bgl,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: BindingResource::Buffer(uniform_buf.as_entire_buffer_binding()),
            }],
        });
        let instances_bg = gpu.device.create_bind_group(&BindGroupDescriptor {
            label: None,
            layout: &gpu.instances_bgl,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: BindingResource::Buffer(instance_buf.as_entire_buffer_binding()),
            }],
        });

        Self {
            texture,
            uniform_buf,
            instance_buf,
            texture_bg,
            uniforms_bg,
            instances_bg,
            instance_count: 0,
        }
    }

    fn upload(&self, gpu: &Gpu, image: &RgbaImage) {
        gpu.queue.write_texture(
            TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: Origin3d::ZERO,
                aspect: TextureAspect::All,
            },
            image.as_raw(),
            TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * image.width()),
                rows_per_image: None,
            },
            self.texture.size(),
        );
    }

    fn set_instances(&mut self, gpu: &Gpu, instances: &[Quad]) {
        let size = mem::size_of_val(instances) as u64;
        if self.instance_buf.size() < size {
            self.instance_buf = gpu.device.create_buffer(&BufferDescriptor {
                label: None,
                size,
                usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.instances_bg = gpu.device.create_bind_group(&BindGroupDescriptor {
                label: None,
                layout: &gpu.instances_bgl,
                entries: &[BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::Buffer(self.instance_buf.as_entire_buffer_binding()),
                }],
            });
        }
        gpu.queue
            .write_buffer(&self.instance_buf, 0, bytemuck::cast_slice(instances));
        self.instance_count = instances.len() as u32;
    }

    fn draw(&self, p: &mut Pass<'_>) {
        // Uniforms are written once per submission; every `Drawable` has its own buffer.
        let uniforms = Uniforms {
            render_target_size: p.render_target_size,
        };
        p.gpu
            .queue
            .write_buffer(&self.uniform_buf, 0, bytemuck::bytes_of(&uniforms));

        p.pass.set_pipeline(&p.gpu.render_pipeline);
        p.pass.set_bind_group(0, &p.gpu.sampler_bg, &[]);
        p.pass.set_bind_group(1, &self.texture_bg, &[]);
        p.pass.set_bind_group(2, &self.uniforms_bg, &[]);
        p.pass.set_bind_group(3, &self.instances_bg, &[]);
        p.pass.draw(0..4, 0..self.instance_count);
    }
}
