//! Unit tests for the bring-up sequence

use crate::common::{mock_device, test_config, MockBus, MockDelay};
use icm20948_stream::{
    AccelRange, Bank, BringUpStep, Calibration, Error, GyroRange, Icm20948Driver,
};

#[test]
fn bring_up_programs_power_rate_and_filter_registers() {
    let (mut dev, bus) = mock_device();
    let mut config = test_config();
    config.gyro_range = GyroRange::Dps2000;
    config.accel_range = AccelRange::G16;
    config.sample_rate = 50;
    let mut cal = Calibration::default();

    dev.bring_up(&config, &mut cal).unwrap();

    // Wake leaves CLKSEL=1, every sensor enabled
    assert_eq!(bus.get_register(Bank::Bank0, 0x06), 0x01);
    assert_eq!(bus.get_register(Bank::Bank0, 0x07), 0x00);

    // divider = 1125/50 - 1 = 21 on both rate dividers
    assert_eq!(bus.get_register(Bank::Bank2, 0x00), 21);
    assert_eq!(bus.get_register(Bank::Bank2, 0x11), 21);

    // Filter target 21 >> 1 = 10 selects the 6 Hz tier on both sensors:
    // FS bits 0x06 | filter enable 0x01 | tier code 6 << 3
    assert_eq!(bus.get_register(Bank::Bank2, 0x01), 0x37);
    assert_eq!(bus.get_register(Bank::Bank2, 0x14), 0x37);

    assert_eq!(dev.sample_rate(), 50);
    assert!(!dev.mag_enabled());
}

#[test]
fn who_am_i_mismatch_is_fatal() {
    let (mut dev, bus) = mock_device();
    bus.set_who_am_i(0x12);
    let mut cal = Calibration::default();

    let result = dev.bring_up(&test_config(), &mut cal);

    match result {
        Err(Error::BringUp { step, source }) => {
            assert_eq!(step, BringUpStep::Wake);
            assert!(matches!(*source, Error::InvalidDevice(0x12)));
        }
        other => panic!("expected an InvalidDevice failure, got {other:?}"),
    }
}

#[test]
fn transport_failure_identifies_the_reset_step() {
    let (mut dev, bus) = mock_device();
    bus.fail_bank_switch(true);
    let mut cal = Calibration::default();

    let result = dev.bring_up(&test_config(), &mut cal);

    match result {
        Err(Error::BringUp { step, .. }) => assert_eq!(step, BringUpStep::Reset),
        other => panic!("expected a bring-up failure at reset, got {other:?}"),
    }
}

#[test]
fn factory_biases_load_at_the_stored_range() {
    let (mut dev, bus) = mock_device();
    // Gyro offsets are stored at 1000 deg/s, accel at 8 g; configuring those
    // ranges applies them unscaled.
    bus.set_register(Bank::Bank2, 0x03, 0x00);
    bus.set_register(Bank::Bank2, 0x04, 100);
    bus.set_register(Bank::Bank2, 0x05, 0xFF);
    bus.set_register(Bank::Bank2, 0x06, 0x9C); // -100
    bus.set_register(Bank::Bank1, 0x14, 0x00);
    bus.set_register(Bank::Bank1, 0x15, 50);

    let mut config = test_config();
    config.gyro_range = GyroRange::Dps1000;
    config.accel_range = AccelRange::G8;
    config.apply_hw_offsets = true;
    let mut cal = Calibration::default();

    dev.bring_up(&config, &mut cal).unwrap();

    assert_eq!(cal.gyro_bias, [100.0, -100.0, 0.0]);
    assert_eq!(cal.accel_bias, [50.0, 0.0, 0.0]);
}

#[test]
fn factory_biases_rescale_for_other_ranges() {
    let (mut dev, bus) = mock_device();
    bus.set_register(Bank::Bank2, 0x04, 100);
    bus.set_register(Bank::Bank1, 0x15, 100);

    let mut config = test_config();
    config.gyro_range = GyroRange::Dps250; // factor 4 from the 1000 deg/s store
    config.accel_range = AccelRange::G16; // factor 0.5 from the 8 g store
    config.apply_hw_offsets = true;
    let mut cal = Calibration::default();

    dev.bring_up(&config, &mut cal).unwrap();

    assert_eq!(cal.gyro_bias[0], 400.0);
    assert_eq!(cal.accel_bias[0], 50.0);
}

#[test]
fn biases_stay_default_when_offsets_not_requested() {
    let (mut dev, bus) = mock_device();
    bus.set_register(Bank::Bank2, 0x04, 100);
    let mut cal = Calibration::default();

    dev.bring_up(&test_config(), &mut cal).unwrap();

    assert_eq!(cal.gyro_bias, [0.0; 3]);
}

#[test]
fn construction_retries_after_a_transient_failure() {
    let bus = MockBus::new();
    let handle = bus.clone();
    // The first write of the first attempt fails; the injected fault clears
    // itself, so the second attempt succeeds.
    handle.fail_next_write();

    let mut config = test_config();
    config.bringup_attempts = 2;

    let driver = Icm20948Driver::with_bus(bus, MockDelay, &config);
    assert!(driver.is_ok(), "second bring-up attempt should succeed");
}

#[test]
fn construction_fails_once_attempts_are_exhausted() {
    let bus = MockBus::new();
    let handle = bus.clone();
    handle.fail_bank_switch(true);

    let mut config = test_config();
    config.bringup_attempts = 2;

    let result = Icm20948Driver::with_bus(bus, MockDelay, &config);
    assert!(matches!(result, Err(Error::BringUp { .. })));
}
