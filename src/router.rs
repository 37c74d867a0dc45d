use bevy::{platform::collections::HashMap, prelude::*};

use crate::{
    controller::DeviceId,
    controller_input::{ControlMap, ControllerInput, PointerRay},
    events::{HoverChanged, PointerEvent, PointerEventKind},
    field::LayerMask,
    handlers::{Capability, HandlerHierarchy, PointerHierarchy},
    pointer::PointerState,
    raycast::{PointerHit, RayResolver},
    registry::Controllers,
};

#[derive(Resource, Clone, Copy, Debug)]
pub struct PointerRouterConfig {
    /// Control that acts as the primary button.
    pub select: ControlMap,
    /// Fields the physics cast considers.
    pub layer_mask: LayerMask,
    /// Negative means unlimited.
    pub max_distance: f32,
    pub drag_threshold: f32,
    /// Keep routing even without a registry or active controllers.
    pub force_module_active: bool,
    /// Seconds.
    pub double_click_window: f64,
}

impl Default for PointerRouterConfig {
    fn default() -> Self {
        Self {
            select: ControlMap::Trigger,
            layer_mask: LayerMask::ALL,
            max_distance: -1.0,
            drag_threshold: 0.1,
            force_module_active: false,
            double_click_window: 0.3,
        }
    }
}

/// One controllers input for a routing tick.
#[derive(Clone, Copy, Debug)]
pub struct PointerTick {
    pub device: DeviceId,
    pub pressed: bool,
    pub released: bool,
    pub hit: Option<PointerHit>,
}

/// Notifications produced by the router, in emission order.
#[derive(Debug, Default)]
pub struct RouterOutput {
    pub events: Vec<PointerEvent>,
    pub hover_changes: Vec<HoverChanged>,
}

impl RouterOutput {
    fn emit(&mut self, pointer: &PointerState, target: Option<Entity>, kind: PointerEventKind) {
        let Some(target) = target else {
            return;
        };
        self.events.push(PointerEvent {
            pointer: pointer.id,
            target,
            kind,
            data: pointer.snapshot(),
        });
    }
}

#[derive(Clone, Copy, Debug)]
struct ClickHistory {
    target: Option<Entity>,
    time: f64,
    count: u32,
}

/// Owns all pointer state, fed once per tick by [`route_pointers`].
#[derive(Resource, Debug, Default)]
pub struct PointerRouter {
    pointers: HashMap<DeviceId, PointerState>,
    // outlives the pointer, which is dropped on every release
    clicks: HashMap<DeviceId, ClickHistory>,
    active: bool,
}

impl PointerRouter {
    pub fn is_active(&self) -> bool {
        self.active
    }
    pub fn pointer(&self, id: DeviceId) -> Option<&PointerState> {
        self.pointers.get(&id)
    }
    pub fn pointers(&self) -> impl Iterator<Item = &PointerState> {
        self.pointers.values()
    }
    pub fn is_pointer_over(&self, id: DeviceId) -> bool {
        self.pointer(id).is_some_and(|p| p.enter.is_some())
    }

    /// Cancels every press and drag, exits everything hovered and forgets all pointers.
    pub fn deactivate(&mut self, hierarchy: &impl PointerHierarchy, out: &mut RouterOutput) {
        let mut ids = self.pointers.keys().copied().collect::<Vec<_>>();
        ids.sort();
        for id in ids {
            if let Some(mut pointer) = self.pointers.remove(&id) {
                cancel_interaction(&mut pointer, hierarchy, out);
                update_hover(&mut pointer, None, hierarchy, out);
            }
        }
        self.clicks.clear();
        self.active = false;
    }

    /// Drops pointers whose device is no longer routed, ending their press, drag and hover
    /// first.
    pub fn discard_stale(
        &mut self,
        is_routed: impl Fn(DeviceId) -> bool,
        hierarchy: &impl PointerHierarchy,
        out: &mut RouterOutput,
    ) {
        let mut stale = self
            .pointers
            .keys()
            .chain(self.clicks.keys())
            .copied()
            .filter(|id| !is_routed(*id))
            .collect::<Vec<_>>();
        stale.sort();
        stale.dedup();
        for id in stale {
            if let Some(mut pointer) = self.pointers.remove(&id) {
                debug!("discarding pointer {id:?}");
                cancel_interaction(&mut pointer, hierarchy, out);
                update_hover(&mut pointer, None, hierarchy, out);
            }
            self.clicks.remove(&id);
        }
    }

    /// Runs one tick for one controller: press, release, then hover and drag.
    pub fn process(
        &mut self,
        tick: PointerTick,
        hierarchy: &impl PointerHierarchy,
        config: &PointerRouterConfig,
        now: f64,
        out: &mut RouterOutput,
    ) {
        self.active = true;
        let mut pointer = self
            .pointers
            .remove(&tick.device)
            .unwrap_or_else(|| PointerState::new(tick.device));
        pointer.update_from_hit(tick.hit, tick.pressed);

        if tick.pressed {
            let history = self.clicks.get(&tick.device).copied();
            let history = process_press(&mut pointer, history, hierarchy, config, now, out);
            self.clicks.insert(tick.device, history);
        }
        if tick.released {
            process_release(&mut pointer, hierarchy, out);
            update_hover(&mut pointer, None, hierarchy, out);
            return;
        }
        let target = pointer.target();
        update_hover(&mut pointer, target, hierarchy, out);
        process_drag(&mut pointer, hierarchy, config, out);
        self.pointers.insert(tick.device, pointer);
    }
}

fn process_press(
    pointer: &mut PointerState,
    history: Option<ClickHistory>,
    hierarchy: &impl PointerHierarchy,
    config: &PointerRouterConfig,
    now: f64,
    out: &mut RouterOutput,
) -> ClickHistory {
    let current = pointer.target();
    pointer.eligible_for_click = true;
    pointer.delta = Vec2::ZERO;
    pointer.dragging = false;
    pointer.use_drag_threshold = true;
    pointer.press_position = pointer.position;
    pointer.press_hit = pointer.current_hit;

    if pointer.enter != current {
        update_hover(pointer, current, hierarchy, out);
    }

    let down_target = current.and_then(|t| hierarchy.handler_for(t, Capability::Press));
    let pressed = down_target
        .or_else(|| current.and_then(|t| hierarchy.handler_for(t, Capability::Click)));

    pointer.click_count = match history {
        Some(h) if h.target == pressed && now - h.time < config.double_click_window => {
            h.count + 1
        }
        _ => 1,
    };
    pointer.click_time = now;
    pointer.press = pressed;
    pointer.raw_press = current;
    pointer.drag = current.and_then(|t| hierarchy.handler_for(t, Capability::Drag));

    out.emit(pointer, down_target, PointerEventKind::Down);
    out.emit(pointer, pointer.drag, PointerEventKind::InitializePotentialDrag);

    ClickHistory {
        target: pressed,
        time: now,
        count: pointer.click_count,
    }
}

fn process_release(
    pointer: &mut PointerState,
    hierarchy: &impl PointerHierarchy,
    out: &mut RouterOutput,
) {
    let current = pointer.target();
    out.emit(pointer, press_handler(pointer.press, hierarchy), PointerEventKind::Up);

    let click_handler = current.and_then(|t| hierarchy.handler_for(t, Capability::Click));
    if pointer.press.is_some() && pointer.press == click_handler && pointer.eligible_for_click {
        out.emit(pointer, pointer.press, PointerEventKind::Click);
    } else if pointer.drag.is_some() && pointer.dragging {
        let drop_target = current.and_then(|t| hierarchy.handler_for(t, Capability::Drop));
        out.emit(pointer, drop_target, PointerEventKind::Drop);
    }

    pointer.eligible_for_click = false;
    pointer.press = None;
    pointer.raw_press = None;

    if pointer.dragging {
        out.emit(pointer, pointer.drag, PointerEventKind::EndDrag);
    }
    pointer.dragging = false;
    pointer.drag = None;

    if current != pointer.enter {
        let previous = pointer.enter;
        exit_and_enter(pointer, None, hierarchy, out);
        exit_and_enter(pointer, current, hierarchy, out);
        if pointer.enter != previous {
            out.hover_changes.push(HoverChanged {
                pointer: pointer.id,
                previous,
                current: pointer.enter,
            });
        }
    }
}

/// Up to a pending press target and EndDrag to an active drag, without click or drop.
fn cancel_interaction(
    pointer: &mut PointerState,
    hierarchy: &impl PointerHierarchy,
    out: &mut RouterOutput,
) {
    out.emit(pointer, press_handler(pointer.press, hierarchy), PointerEventKind::Up);
    if pointer.dragging {
        out.emit(pointer, pointer.drag, PointerEventKind::EndDrag);
    }
    pointer.eligible_for_click = false;
    pointer.press = None;
    pointer.raw_press = None;
    pointer.dragging = false;
    pointer.drag = None;
}

fn process_drag(
    pointer: &mut PointerState,
    hierarchy: &impl PointerHierarchy,
    config: &PointerRouterConfig,
    out: &mut RouterOutput,
) {
    if !pointer.is_moving() || pointer.drag.is_none() {
        return;
    }
    if !pointer.dragging && pointer.should_start_drag(config.drag_threshold) {
        if pointer.press != pointer.drag {
            out.emit(pointer, press_handler(pointer.press, hierarchy), PointerEventKind::Up);
            pointer.eligible_for_click = false;
            pointer.press = None;
            pointer.raw_press = None;
        }
        out.emit(pointer, pointer.drag, PointerEventKind::BeginDrag);
        pointer.dragging = true;
    }
    if pointer.dragging {
        out.emit(pointer, pointer.drag, PointerEventKind::Drag);
    }
}

/// The press target only gets up when it handles presses, click only targets do not.
fn press_handler(press: Option<Entity>, hierarchy: &impl PointerHierarchy) -> Option<Entity> {
    press.filter(|p| {
        hierarchy
            .handlers(*p)
            .is_some_and(|h| h.handles(Capability::Press))
    })
}

fn update_hover(
    pointer: &mut PointerState,
    target: Option<Entity>,
    hierarchy: &impl PointerHierarchy,
    out: &mut RouterOutput,
) {
    let previous = pointer.enter;
    exit_and_enter(pointer, target, hierarchy, out);
    if pointer.enter != previous {
        out.hover_changes.push(HoverChanged {
            pointer: pointer.id,
            previous,
            current: pointer.enter,
        });
    }
}

/// Exits every hovered entity outside `target`s chain, then enters the rest of that chain,
/// child first.
///
/// Exits come from the chain recorded when the entities were entered, so entities that
/// were reparented or lost their parents since still get exactly one exit.
fn exit_and_enter(
    pointer: &mut PointerState,
    target: Option<Entity>,
    hierarchy: &impl PointerHierarchy,
    out: &mut RouterOutput,
) {
    let Some(new) = target else {
        for entity in std::mem::take(&mut pointer.hovered) {
            out.emit(pointer, Some(entity), PointerEventKind::Exit);
        }
        pointer.enter = None;
        return;
    };
    if pointer.enter == target {
        return;
    }

    let chain = hierarchy.chain(new);
    for entity in pointer.hovered.clone() {
        if !chain.contains(&entity) {
            out.emit(pointer, Some(entity), PointerEventKind::Exit);
            pointer.hovered.retain(|e| *e != entity);
        }
    }

    pointer.enter = target;
    for &entity in &chain {
        if !pointer.hovered.contains(&entity) {
            out.emit(pointer, Some(entity), PointerEventKind::Enter);
        }
    }
    // hovered stays ordered child first
    pointer.hovered = chain;
}

/// Feeds every active and available registered controller through the router.
pub fn route_pointers(
    controllers: Controllers,
    inputs: Query<(&ControllerInput, &PointerRay)>,
    resolver: RayResolver,
    hierarchy: HandlerHierarchy,
    config: Res<PointerRouterConfig>,
    mut router: ResMut<PointerRouter>,
    time: Res<Time<Real>>,
    mut events: EventWriter<PointerEvent>,
    mut hover_events: EventWriter<HoverChanged>,
) {
    let mut out = RouterOutput::default();
    let supported = config.force_module_active || controllers.registry_exists();
    let should_activate =
        supported && (config.force_module_active || controllers.active_count() > 0);

    if !should_activate {
        if router.is_active() {
            info!("no active controllers, deactivating pointer routing");
            router.deactivate(&hierarchy, &mut out);
        }
    } else {
        router.active = true;
        let routed = controllers
            .iter_active()
            .filter(|(_, controller)| controller.available)
            .map(|(entity, controller)| (entity, controller.device_id))
            .collect::<Vec<_>>();
        router.discard_stale(
            |id| routed.iter().any(|(_, routed_id)| *routed_id == id),
            &hierarchy,
            &mut out,
        );

        let now = time.elapsed_secs_f64();
        for (entity, device) in routed {
            let Ok((input, ray)) = inputs.get(entity) else {
                continue;
            };
            let tick = PointerTick {
                device,
                pressed: input.get_button_pressed(config.select),
                released: input.get_button_released(config.select),
                hit: resolver.resolve(ray.0, config.layer_mask, config.max_distance),
            };
            router.process(tick, &hierarchy, &config, now, &mut out);
        }
    }

    events.write_batch(out.events);
    hover_events.write_batch(out.hover_changes);
}
