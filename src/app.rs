use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowId},
};

use crate::config::RenderConfig;
use crate::wgpu_device::WgpuDevice;
use crate::window::{MousePress, MouseRelease, Resize};
use crate::PlutoniumRenderer;

type Setup = Box<dyn FnMut(&mut PlutoniumRenderer)>;

pub struct PlutoniumApp {
    config: RenderConfig,
    renderer: Option<PlutoniumRenderer>,
    window: Option<Arc<Window>>,
    last_frame: std::time::Instant,
    cursor: (f32, f32),
    setup: Setup,
}

impl PlutoniumApp {
    /// `setup` runs once, right after the renderer is created.
    pub fn new<F>(config: RenderConfig, setup: F) -> Self
    where
        F: FnMut(&mut PlutoniumRenderer) + 'static,
    {
        Self {
            config,
            renderer: None,
            window: None,
            last_frame: std::time::Instant::now(),
            cursor: (0.0, 0.0),
            setup: Box::new(setup),
        }
    }

    pub fn renderer(&mut self) -> Option<&mut PlutoniumRenderer> {
        self.renderer.as_mut()
    }

    pub fn window(&self) -> Option<&Window> {
        self.window.as_ref().map(|w| w.as_ref())
    }

    fn create(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window_attributes = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.width,
                self.config.height,
            ));
        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let size = window.inner_size();
        let device = WgpuDevice::new(window.clone(), &self.config)?;

        let mut renderer = PlutoniumRenderer::new(device, &self.config, size.width, size.height);
        (self.setup)(&mut renderer);
        self.renderer = Some(renderer);
        self.window = Some(window);
        self.last_frame = std::time::Instant::now();
        Ok(())
    }
}

impl ApplicationHandler<()> for PlutoniumApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }
        if let Err(err) = self.create(event_loop) {
            log::error!("failed to start renderer: {:#}", err);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = (position.x as f32, position.y as f32);
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                let (x, y) = self.cursor;
                match state {
                    ElementState::Pressed => renderer.world.send_event(MousePress { x, y }),
                    ElementState::Released => renderer.world.send_event(MouseRelease { x, y }),
                }
            }
            WindowEvent::RedrawRequested => {
                let now = std::time::Instant::now();
                let delta = (now - self.last_frame).as_secs_f32();
                self.last_frame = now;

                renderer.progress(delta);

                // Request next frame
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::Resized(new_size) => {
                renderer.world.send_event(Resize {
                    width: new_size.width,
                    height: new_size.height,
                });
            }
            WindowEvent::CloseRequested => {
                if let Some(mut renderer) = self.renderer.take() {
                    renderer.shutdown();
                }
                event_loop.exit();
            }
            _ => (),
        }
    }
}

pub fn run_app<F>(config: RenderConfig, setup: F) -> anyhow::Result<()>
where
    F: FnMut(&mut PlutoniumRenderer) + 'static,
{
    let event_loop = EventLoop::new()?;
    let mut app = PlutoniumApp::new(config, setup);

    event_loop.run_app(&mut app)?;
    Ok(())
}
