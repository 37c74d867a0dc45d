use bevy::{
    app::PluginGroupBuilder,
    prelude::*,
    transform::systems::{mark_dirty_trees, propagate_parent_transforms, sync_simple_transforms},
};
use controller::{ControllerInitialized, InputFocusChanged};
use events::{HoverChanged, PointerEvent};
use router::{PointerRouter, PointerRouterConfig};
use std::hash::Hash;
pub mod controller;
pub mod controller_input;
pub mod debug;
pub mod events;
pub mod fallback;
pub mod field;
pub mod hand;
pub mod handlers;
pub mod head;
pub mod pointer;
pub mod raycast;
pub mod registry;
pub mod router;
#[cfg(feature = "tracked")]
pub mod tracked;
pub mod ui;

pub struct VrPointerCorePlugin;
impl Plugin for VrPointerCorePlugin {
    fn build(&self, app: &mut App) {
        app.configure_sets(
            PreUpdate,
            (
                VrPreUpdateSets::UpdateDevices,
                VrPreUpdateSets::PropagatePoses,
                VrPreUpdateSets::UpdatePointerRays,
                VrPreUpdateSets::RoutePointers,
            )
                .chain(),
        );
        app.configure_sets(
            PreUpdate,
            SyncDevices.in_set(VrPreUpdateSets::UpdateDevices),
        );
        app.add_event::<ControllerInitialized>();
        app.add_event::<InputFocusChanged>();
        app.add_event::<PointerEvent>();
        app.add_event::<HoverChanged>();
        app.init_resource::<PointerRouterConfig>();
        app.init_resource::<PointerRouter>();
        app.add_systems(
            PreUpdate,
            (head::update_fallback_heads, head::update_rig)
                .chain()
                .in_set(VrPreUpdateSets::UpdateDevices)
                .after(SyncDevices),
        );
        app.add_systems(
            PreUpdate,
            (
                mark_dirty_trees,
                propagate_parent_transforms,
                sync_simple_transforms,
            )
                .chain()
                .in_set(VrPreUpdateSets::PropagatePoses),
        );
        app.add_systems(
            PreUpdate,
            controller::update_pose_pointer_rays.in_set(VrPreUpdateSets::UpdatePointerRays),
        );
        app.add_systems(
            PreUpdate,
            router::route_pointers.in_set(VrPreUpdateSets::RoutePointers),
        );
        app.add_systems(
            Update,
            (
                controller::warn_invalid_pairings,
                controller::update_hide_on_focus_lost,
            ),
        );
    }
}

/// Backends copying runtime or mouse state onto devices run in here.
#[derive(SystemSet, Clone, Copy, Hash, PartialEq, Eq, Debug)]
pub struct SyncDevices;

/// Whether a device takes part in routing, cleared on devices under a disabled rig.
#[derive(Deref, DerefMut, Debug, Clone, Copy, Component, Reflect)]
pub struct DeviceActive(pub bool);

impl Default for DeviceActive {
    fn default() -> Self {
        DeviceActive(true)
    }
}

#[derive(SystemSet, Clone, Copy, Hash, PartialEq, Eq, Debug)]
pub enum VrPreUpdateSets {
    UpdateDevices,
    /// Poses written in [`VrPreUpdateSets::UpdateDevices`] are propagated to
    /// [`GlobalTransform`] here, so pointer rays see this frames poses.
    PropagatePoses,
    UpdatePointerRays,
    RoutePointers,
}

pub struct VrPointerPlugins;

impl PluginGroup for VrPointerPlugins {
    fn build(self) -> PluginGroupBuilder {
        let group = PluginGroupBuilder::start::<Self>()
            .add(VrPointerCorePlugin)
            .add(fallback::VrFallbackPlugin);
        #[cfg(feature = "tracked")]
        let group = group.add(tracked::VrTrackedPlugin);
        group
    }
}
