#[cfg(feature = "metal")]
use gfx_backend_metal as back;

#[cfg(all(feature = "vulkan", not(feature = "metal")))]
use gfx_backend_vulkan as back;

use crate::config::Config;
use crate::context;
use crate::error::{self, Error, Result};
use crate::renderer::{FrameOutcome, Renderer};

use gfx_hal::{window, Backend, Instance};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use winit::event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::{Window, WindowBuilder};

/// Sent from the render thread when it stops on its own.
#[derive(Debug)]
pub enum RenderEvent {
    Stopped,
}

/// Requests passed from the event loop to the render thread.
#[derive(Debug)]
pub struct Signals {
    close: AtomicBool,
    redraw: AtomicBool,
    resize: Mutex<Option<window::Extent2D>>,
}

impl Default for Signals {
    fn default() -> Self {
        Self::new()
    }
}

impl Signals {
    /// The first frame is requested up front.
    pub fn new() -> Self {
        Signals {
            close: AtomicBool::new(false),
            redraw: AtomicBool::new(true),
            resize: Mutex::new(None),
        }
    }

    pub fn request_close(&self) {
        self.close.store(true, Ordering::Relaxed);
    }

    pub fn should_close(&self) -> bool {
        self.close.load(Ordering::Relaxed)
    }

    pub fn request_redraw(&self) {
        self.redraw.store(true, Ordering::Relaxed);
    }

    pub fn take_redraw(&self) -> bool {
        self.redraw.swap(false, Ordering::Relaxed)
    }

    /// Only the latest size is kept.
    pub fn request_resize(&self, dims: window::Extent2D) {
        *self.resize.lock().unwrap_or_else(PoisonError::into_inner) = Some(dims);
        self.request_redraw();
    }

    pub fn take_resize(&self) -> Option<window::Extent2D> {
        self.resize
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

pub fn create_window(config: &Config, event_loop: &EventLoop<RenderEvent>) -> Result<Window> {
    let dims = config.extent();
    WindowBuilder::new()
        .with_title(config.title.clone())
        .with_inner_size(winit::dpi::Size::Physical(winit::dpi::PhysicalSize::new(
            dims.width,
            dims.height,
        )))
        .with_min_inner_size(winit::dpi::Size::Logical(winit::dpi::LogicalSize::new(
            64.0, 64.0,
        )))
        .build(event_loop)
        .map_err(error::context(Error::Backend, "create window"))
}

/// Opens the window, draws the triangle and serves the event loop until the
/// window is closed. Never returns.
pub fn run(config: Config) -> ! {
    let event_loop = EventLoop::<RenderEvent>::with_user_event();
    let window = create_window(&config, &event_loop).unwrap_or_else(|err| abort(&err));

    let signals = Arc::new(Signals::new());
    let handler = spawn_render_thread(window, config, Arc::clone(&signals), &event_loop)
        .unwrap_or_else(|err| abort(&err));
    let render_thread = handler.thread().clone();
    let mut handler = Some(handler);

    event_loop.run(move |event, _, control_flow| {
        if *control_flow == ControlFlow::Exit {
            return;
        }
        *control_flow = ControlFlow::Wait;
        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested
                | WindowEvent::KeyboardInput {
                    input:
                        KeyboardInput {
                            virtual_keycode: Some(VirtualKeyCode::Escape),
                            state: ElementState::Pressed,
                            ..
                        },
                    ..
                } => {
                    log::info!("closing");
                    signals.request_close();
                    render_thread.unpark();
                    finish(handler.take(), control_flow);
                }
                WindowEvent::Resized(size) => {
                    signals.request_resize(window::Extent2D {
                        width: size.width,
                        height: size.height,
                    });
                    render_thread.unpark();
                }
                _ => {}
            },
            Event::RedrawRequested(_) => {
                signals.request_redraw();
                render_thread.unpark();
            }
            Event::UserEvent(RenderEvent::Stopped) => finish(handler.take(), control_flow),
            _ => {}
        }
    })
}

fn spawn_render_thread(
    window: Window,
    config: Config,
    signals: Arc<Signals>,
    event_loop: &EventLoop<RenderEvent>,
) -> Result<JoinHandle<Result<()>>> {
    let proxy = event_loop.create_proxy();
    thread::Builder::new()
        .name("render".into())
        .spawn(move || {
            let result = render_thread(window, &config, &signals);
            if proxy.send_event(RenderEvent::Stopped).is_err() {
                log::debug!("event loop already gone");
            }
            result
        })
        .map_err(error::context(Error::RenderThread, "spawn render thread"))
}

fn render_thread(window: Window, config: &Config, signals: &Signals) -> Result<()> {
    let instance = back::Instance::create(&config.title, 1)
        .map_err(error::context(Error::Backend, "create instance"))?;
    let mut surface = unsafe { instance.create_surface(&window) }
        .map_err(error::context(Error::Backend, "create surface"))?;

    let size = window.inner_size();
    let dims = window::Extent2D {
        width: size.width,
        height: size.height,
    };
    let result = draw_until_closed::<back::Backend>(
        instance.enumerate_adapters(),
        &mut surface,
        dims,
        config,
        signals,
    );

    unsafe {
        instance.destroy_surface(surface);
    }
    result
}

/// What the frame policy drives: the renderer bound to its queue in the
/// app, a recorder in tests.
pub trait FrameTarget {
    fn resize(&mut self, dims: window::Extent2D) -> Result<()>;
    fn render(&mut self) -> Result<FrameOutcome>;
}

struct QueueTarget<'r, 'a, B: Backend> {
    renderer: Renderer<'a, B>,
    queue: &'r mut B::CommandQueue,
}

impl<'r, 'a, B: Backend> FrameTarget for QueueTarget<'r, 'a, B> {
    fn resize(&mut self, dims: window::Extent2D) -> Result<()> {
        self.renderer.resize(dims)
    }

    fn render(&mut self) -> Result<FrameOutcome> {
        self.renderer.render(self.queue)
    }
}

/// Decides when the static frame is drawn.
///
/// A zero-sized (minimized) window is never drawn. A frame whose swapchain
/// had to be rebuilt is retried once, then skipped until the next redraw.
#[derive(Debug)]
pub struct FramePolicy {
    visible: bool,
}

impl FramePolicy {
    pub fn new(dims: window::Extent2D) -> Self {
        FramePolicy {
            visible: is_visible(dims),
        }
    }

    pub fn step<T: FrameTarget>(
        &mut self,
        target: &mut T,
        resize: Option<window::Extent2D>,
        redraw: bool,
    ) -> Result<()> {
        if let Some(dims) = resize {
            self.visible = is_visible(dims);
            if self.visible {
                target.resize(dims)?;
            }
        }

        if redraw && self.visible {
            if target.render()? == FrameOutcome::SwapchainRecreated
                && target.render()? == FrameOutcome::SwapchainRecreated
            {
                log::warn!("surface still out of date, waiting for the next redraw");
            }
        }
        Ok(())
    }
}

fn is_visible(dims: window::Extent2D) -> bool {
    dims.width > 0 && dims.height > 0
}

fn draw_until_closed<B: Backend>(
    adapters: Vec<gfx_hal::adapter::Adapter<B>>,
    surface: &mut B::Surface,
    dims: window::Extent2D,
    config: &Config,
    signals: &Signals,
) -> Result<()> {
    let mut ctx = context::open(adapters, surface)?;
    let family = ctx.queue_group.family;
    let renderer = Renderer::new(
        surface,
        &ctx.adapter,
        &ctx.device,
        family,
        dims,
        config.clear_color,
    )?;
    let mut target = QueueTarget {
        renderer,
        queue: &mut ctx.queue_group.queues[0],
    };

    let mut policy = FramePolicy::new(dims);
    while !signals.should_close() {
        policy.step(&mut target, signals.take_resize(), signals.take_redraw())?;
        thread::park();
    }
    Ok(())
}

fn finish(handler: Option<JoinHandle<Result<()>>>, control_flow: &mut ControlFlow) {
    let handler = match handler {
        Some(handler) => handler,
        None => return,
    };
    match handler.join() {
        Ok(Ok(())) => *control_flow = ControlFlow::Exit,
        Ok(Err(err)) => abort(&err),
        Err(_) => abort(&Error::RenderThread("render thread panicked".into())),
    }
}

fn abort(err: &Error) -> ! {
    log::error!("{}", err);
    std::process::exit(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct Recorder {
        outcomes: VecDeque<Result<FrameOutcome>>,
        renders: usize,
        resizes: Vec<window::Extent2D>,
    }

    impl Recorder {
        fn with_outcomes(outcomes: Vec<Result<FrameOutcome>>) -> Self {
            Recorder {
                outcomes: outcomes.into_iter().collect(),
                ..Recorder::default()
            }
        }
    }

    impl FrameTarget for Recorder {
        fn resize(&mut self, dims: window::Extent2D) -> Result<()> {
            self.resizes.push(dims);
            Ok(())
        }

        fn render(&mut self) -> Result<FrameOutcome> {
            self.renders += 1;
            self.outcomes
                .pop_front()
                .unwrap_or(Ok(FrameOutcome::Presented))
        }
    }

    fn extent(width: u32, height: u32) -> window::Extent2D {
        window::Extent2D { width, height }
    }

    #[test]
    fn draws_once_per_redraw() {
        let mut policy = FramePolicy::new(extent(800, 600));
        let mut target = Recorder::default();

        policy.step(&mut target, None, true).unwrap();
        assert_eq!(target.renders, 1);

        policy.step(&mut target, None, false).unwrap();
        assert_eq!(target.renders, 1);
    }

    #[test]
    fn minimized_window_is_not_drawn_until_restored() {
        let mut policy = FramePolicy::new(extent(800, 600));
        let mut target = Recorder::default();

        policy.step(&mut target, Some(extent(0, 0)), true).unwrap();
        policy.step(&mut target, Some(extent(800, 0)), true).unwrap();
        policy.step(&mut target, None, true).unwrap();
        assert_eq!(target.renders, 0);
        assert!(target.resizes.is_empty());

        policy.step(&mut target, Some(extent(800, 600)), true).unwrap();
        assert_eq!(target.resizes, vec![extent(800, 600)]);
        assert_eq!(target.renders, 1);
    }

    #[test]
    fn zero_sized_start_waits_for_a_real_size() {
        let mut policy = FramePolicy::new(extent(0, 0));
        let mut target = Recorder::default();

        policy.step(&mut target, None, true).unwrap();
        assert_eq!(target.renders, 0);

        policy.step(&mut target, Some(extent(64, 64)), true).unwrap();
        assert_eq!(target.renders, 1);
    }

    #[test]
    fn rebuilt_swapchain_is_retried_once() {
        let mut policy = FramePolicy::new(extent(800, 600));
        let mut target = Recorder::with_outcomes(vec![
            Ok(FrameOutcome::SwapchainRecreated),
            Ok(FrameOutcome::Presented),
        ]);

        policy.step(&mut target, None, true).unwrap();
        assert_eq!(target.renders, 2);
    }

    #[test]
    fn second_rebuild_skips_the_frame() {
        let mut policy = FramePolicy::new(extent(800, 600));
        let mut target = Recorder::with_outcomes(vec![
            Ok(FrameOutcome::SwapchainRecreated),
            Ok(FrameOutcome::SwapchainRecreated),
            Ok(FrameOutcome::Presented),
        ]);

        policy.step(&mut target, None, true).unwrap();
        assert_eq!(target.renders, 2);
        assert_eq!(target.outcomes.len(), 1);

        policy.step(&mut target, None, true).unwrap();
        assert_eq!(target.renders, 3);
    }

    #[test]
    fn render_errors_stop_the_loop() {
        let mut policy = FramePolicy::new(extent(800, 600));
        let mut target =
            Recorder::with_outcomes(vec![Err(Error::Frame("present: DeviceLost".into()))]);

        let err = policy.step(&mut target, None, true).unwrap_err();
        assert!(matches!(err, Error::Frame(_)));
        assert_eq!(target.renders, 1);
    }

    #[test]
    fn first_frame_is_requested() {
        let signals = Signals::new();
        assert!(signals.take_redraw());
        assert!(!signals.take_redraw());
        assert!(!signals.should_close());
    }

    #[test]
    fn resize_keeps_latest_and_requests_redraw() {
        let signals = Signals::new();
        signals.take_redraw();

        signals.request_resize(extent(800, 600));
        signals.request_resize(extent(640, 480));
        assert_eq!(signals.take_resize(), Some(extent(640, 480)));
        assert_eq!(signals.take_resize(), None);
        assert!(signals.take_redraw());
    }

    #[test]
    fn close_wakes_a_parked_thread() {
        let signals = Arc::new(Signals::new());
        let worker = {
            let signals = Arc::clone(&signals);
            thread::spawn(move || {
                while !signals.should_close() {
                    signals.take_redraw();
                    thread::park();
                }
            })
        };

        signals.request_close();
        worker.thread().unpark();
        worker.join().unwrap();
        assert!(signals.should_close());
    }
}
