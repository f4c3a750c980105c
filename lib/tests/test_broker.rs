use std::cell::{Cell, RefCell};

use nix::unistd::Uid;
use voltepatch::broker::{BrokerError, ConfigBroker};
use voltepatch::bundle::{Bundle, BundleValue, PersistableBundle, PersistableValue};
use voltepatch::carrier::{
    CarrierConfigError, CarrierConfigResult, CarrierConfigService, SubscriptionId,
};
use voltepatch::delegation::{
    DelegatedIdentity, DelegationError, DelegationResult, IdentityDelegate,
};

#[derive(Default)]
struct FakeDelegate {
    held: Cell<bool>,
    starts: Cell<u32>,
    stops: Cell<u32>,
    refuse: bool,
}

impl FakeDelegate {
    fn refusing() -> Self {
        FakeDelegate {
            refuse: true,
            ..Default::default()
        }
    }
}

impl IdentityDelegate for FakeDelegate {
    fn start_delegate(&self, _uid: Uid) -> DelegationResult<()> {
        self.starts.set(self.starts.get() + 1);
        if self.refuse {
            return Err(DelegationError::StartFailed("refused".to_string()));
        }
        if self.held.replace(true) {
            return Err(DelegationError::AlreadyHeld);
        }
        Ok(())
    }

    fn stop_delegate(&self) {
        self.held.set(false);
        self.stops.set(self.stops.get() + 1);
    }
}

type OverrideCall = (SubscriptionId, Option<PersistableBundle>, bool);

#[derive(Default)]
struct FakeCarrierConfig {
    calls: RefCell<Vec<OverrideCall>>,
    reject: bool,
}

impl FakeCarrierConfig {
    fn rejecting() -> Self {
        FakeCarrierConfig {
            reject: true,
            ..Default::default()
        }
    }
}

impl CarrierConfigService for FakeCarrierConfig {
    fn override_config(
        &self,
        sub_id: SubscriptionId,
        overrides: Option<&PersistableBundle>,
        persist: bool,
    ) -> CarrierConfigResult<()> {
        self.calls
            .borrow_mut()
            .push((sub_id, overrides.cloned(), persist));
        if self.reject {
            return Err(CarrierConfigError::CommandRejected {
                command: "override".to_string(),
                message: "invalid subscription".to_string(),
            });
        }
        Ok(())
    }

    fn query_config(&self, _sub_id: SubscriptionId, _key: &str) -> CarrierConfigResult<String> {
        Ok(String::new())
    }
}

fn uid() -> Uid {
    Uid::from_raw(2000)
}

#[test]
fn test_apply_config_coerces_and_persists() {
    let delegate = FakeDelegate::default();
    let carrier = FakeCarrierConfig::default();
    let broker = ConfigBroker::new(&delegate, &carrier, uid());

    let mut arguments = Bundle::new();
    arguments.insert("subId", BundleValue::Int(5));
    arguments.insert("clear", BundleValue::Bool(false));
    arguments.insert("carrier_name_string", BundleValue::String("Verizon".to_string()));
    arguments.insert("blob", BundleValue::Bytes(vec![0xff]));

    broker
        .apply_config(SubscriptionId(5), &arguments)
        .unwrap();

    let calls = carrier.calls.borrow();
    assert_eq!(calls.len(), 1);
    let (sub_id, overrides, persist) = &calls[0];
    assert_eq!(*sub_id, SubscriptionId(5));
    assert!(*persist);
    let overrides = overrides.as_ref().unwrap();
    // the raw argument set goes through coercion, control keys included
    assert_eq!(overrides.get("subId"), Some(&PersistableValue::Int(5)));
    assert_eq!(overrides.get("clear"), Some(&PersistableValue::Bool(false)));
    assert_eq!(
        overrides.get("carrier_name_string"),
        Some(&PersistableValue::String("Verizon".to_string()))
    );
    assert_eq!(overrides.get("blob"), None);

    assert_eq!(delegate.starts.get(), 1);
    assert_eq!(delegate.stops.get(), 1);
}

#[test]
fn test_clear_config_sends_null_override_once() {
    let delegate = FakeDelegate::default();
    let carrier = FakeCarrierConfig::default();
    let broker = ConfigBroker::new(&delegate, &carrier, uid());

    broker.clear_config(SubscriptionId(3)).unwrap();

    let calls = carrier.calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], (SubscriptionId(3), None, true));
}

#[test]
fn test_delegation_released_exactly_once_when_service_throws() {
    let delegate = FakeDelegate::default();
    let carrier = FakeCarrierConfig::rejecting();
    let broker = ConfigBroker::new(&delegate, &carrier, uid());

    let err = broker
        .apply_config(SubscriptionId(9), &Bundle::new())
        .unwrap_err();
    assert!(matches!(err, BrokerError::CarrierConfig(_)));

    assert_eq!(delegate.starts.get(), 1);
    assert_eq!(delegate.stops.get(), 1);
}

#[test]
fn test_delegation_failure_skips_service_call_and_release() {
    let delegate = FakeDelegate::refusing();
    let carrier = FakeCarrierConfig::default();
    let broker = ConfigBroker::new(&delegate, &carrier, uid());

    let err = broker.clear_config(SubscriptionId(1)).unwrap_err();
    assert!(matches!(err, BrokerError::Delegation(_)));

    assert!(carrier.calls.borrow().is_empty());
    // a delegation that never started must not be released
    assert_eq!(delegate.stops.get(), 0);
}

#[test]
fn test_delegation_is_not_reentrant() {
    let delegate = FakeDelegate::default();

    let held = DelegatedIdentity::acquire(&delegate, uid()).unwrap();
    let err = DelegatedIdentity::acquire(&delegate, uid()).unwrap_err();
    assert!(matches!(err, DelegationError::AlreadyHeld));

    drop(held);
    assert_eq!(delegate.stops.get(), 1);

    // once released, a fresh bracket may start again
    let reacquired = DelegatedIdentity::acquire(&delegate, uid());
    assert!(reacquired.is_ok());
}

#[test]
fn test_guard_releases_during_unwinding() {
    let delegate = FakeDelegate::default();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _identity = DelegatedIdentity::acquire(&delegate, uid()).unwrap();
        panic!("service blew up");
    }));
    assert!(result.is_err());
    assert_eq!(delegate.stops.get(), 1);
}
