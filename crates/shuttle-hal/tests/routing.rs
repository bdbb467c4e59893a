mod common;

use common::Rig;
use shuttle_hal::mixer::routes::{
    RouteTables, HEADSET_PLAYBACK_SWITCH, MICL_CAPTURE_MUX, SPEAKER_PLAYBACK_SWITCH,
};
use shuttle_hal::router::select_devices;
use shuttle_hal::virtual_hw::{ControlState, VirtualMixer};
use shuttle_hal::{ControlSet, ControlValue, DeviceMask, HalConfig, MixerGateway};

fn switches(mixer: &VirtualMixer) -> (Option<ControlState>, Option<ControlState>) {
    (
        mixer.state(HEADSET_PLAYBACK_SWITCH),
        mixer.state(SPEAKER_PLAYBACK_SWITCH),
    )
}

#[test]
fn router_truth_table() {
    let cases = [
        (DeviceMask::NONE, 0, 0),
        (DeviceMask::OUT_SPEAKER, 0, 1),
        (DeviceMask::OUT_WIRED_HEADPHONE, 1, 0),
        (DeviceMask::OUT_SPEAKER | DeviceMask::OUT_WIRED_HEADPHONE, 1, 1),
        // Only the speaker and headphone bits take part in the selection.
        (DeviceMask::OUT_AUX_DIGITAL | DeviceMask::OUT_BLUETOOTH_SCO, 0, 0),
        (DeviceMask::OUT_WIRED_HEADSET | DeviceMask::OUT_SPEAKER, 0, 1),
    ];
    for (devices, headphone, speaker) in cases {
        let mixer = VirtualMixer::shuttle_codec();
        let mut gateway = MixerGateway::open(Box::new(mixer.clone())).unwrap();
        // Start from everything on so a missing write is visible.
        gateway
            .apply_control_set(&RouteTables::default().speaker_headphone, true)
            .unwrap();

        select_devices(&mut gateway, &RouteTables::default(), devices).unwrap();
        assert_eq!(
            switches(&mixer),
            (
                Some(ControlState::Values(vec![headphone, headphone])),
                Some(ControlState::Values(vec![speaker])),
            ),
            "devices {devices}"
        );
    }
}

#[test]
fn selection_is_idempotent() {
    let mixer = VirtualMixer::shuttle_codec();
    let mut gateway = MixerGateway::open(Box::new(mixer.clone())).unwrap();
    let routes = RouteTables::default();
    let devices = DeviceMask::OUT_WIRED_HEADPHONE | DeviceMask::IN_BUILTIN_MIC;
    select_devices(&mut gateway, &routes, devices).unwrap();
    let once = mixer.snapshot();
    select_devices(&mut gateway, &routes, devices).unwrap();
    assert_eq!(mixer.snapshot(), once);
}

#[test]
fn selection_leaves_capture_controls_alone() {
    let rig = Rig::new();
    let before = rig.mixer.state(MICL_CAPTURE_MUX);
    rig.device
        .set_parameters(&format!(
            "routing={}",
            DeviceMask::OUT_WIRED_HEADPHONE.bits()
        ))
        .unwrap();
    assert_eq!(rig.mixer.state(MICL_CAPTURE_MUX), before);
    assert_eq!(before, Some(ControlState::Item("Right".into())));
}

#[test]
fn configured_tables_replace_builtin_ones() {
    let mut routes = RouteTables::default();
    let mut headphone = ControlSet::new();
    headphone.insert(HEADSET_PLAYBACK_SWITCH, ControlValue::Int(1));
    headphone.insert(SPEAKER_PLAYBACK_SWITCH, ControlValue::Int(1));
    routes.headphone = headphone;
    let rig = Rig::with_config(HalConfig {
        routes,
        ..HalConfig::default()
    });

    rig.device
        .set_parameters(&format!(
            "routing={}",
            DeviceMask::OUT_WIRED_HEADPHONE.bits()
        ))
        .unwrap();
    assert_eq!(
        rig.mixer.state(SPEAKER_PLAYBACK_SWITCH),
        Some(ControlState::Values(vec![1]))
    );
}

#[test]
fn unresolvable_route_is_logged_not_fatal() {
    let mut routes = RouteTables::default();
    routes.none.insert("Earpiece Switch", ControlValue::Int(1));
    let rig = Rig::with_config(HalConfig {
        routes,
        ..HalConfig::default()
    });
    rig.device
        .set_parameters(&format!("routing={}", DeviceMask::OUT_AUX_DIGITAL.bits()))
        .unwrap();
    assert_eq!(
        rig.device.devices(),
        DeviceMask::OUT_AUX_DIGITAL | DeviceMask::IN_BUILTIN_MIC
    );
}

#[test]
fn supported_devices_cover_board_endpoints() {
    let rig = Rig::new();
    let supported = rig.device.supported_devices();
    for device in [
        DeviceMask::OUT_SPEAKER,
        DeviceMask::OUT_WIRED_HEADPHONE,
        DeviceMask::OUT_AUX_DIGITAL,
        DeviceMask::OUT_BLUETOOTH_SCO_CARKIT,
        DeviceMask::IN_BUILTIN_MIC,
        DeviceMask::IN_BLUETOOTH_SCO_HEADSET,
    ] {
        assert!(supported.intersects(device), "{device}");
    }
    assert!(!supported.intersects(DeviceMask::OUT_EARPIECE));
}
