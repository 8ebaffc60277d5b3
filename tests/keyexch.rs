//! Diffie-Hellman key-exchange scenarios: the derive contract, output
//! padding, and key-management round trips.

mod support;

use purveyor::{
    dispatch::KeyHandle, Error, KeyexchContext, KeyexchMethod, KeymgmtMethod, LibCtx, Method,
    ParamKind, ParamValue, Params,
};
use std::sync::Arc;

struct Fixture {
    libctx: Arc<LibCtx>,
    keymgmt: Arc<KeymgmtMethod>,
    keyexch: Arc<KeyexchMethod>,
    domain: KeyHandle,
}

impl Fixture {
    fn new() -> Self {
        support::init_tracing();
        let libctx = LibCtx::new();
        libctx.register_provider("soft", support::soft_init).unwrap();
        let keymgmt = KeymgmtMethod::fetch(&libctx, "DH", None).unwrap();
        let keyexch = KeyexchMethod::fetch(&libctx, "DH", None).unwrap();
        let domain = keymgmt.generate_parameters(&Params::new()).unwrap();
        Self { libctx, keymgmt, keyexch, domain }
    }

    fn key(&self, private: u64) -> KeyHandle {
        self.keymgmt
            .generate_key(
                Some(&self.domain),
                &Params::new().with("priv", ParamValue::Uint(private)),
            )
            .unwrap()
    }

    /// A context with Alice's key bound and Bob's key as the peer. Even
    /// exponents land the shared secret on 1, whose natural encoding is a
    /// single byte, one shorter than the two-byte modulus.
    fn ready_context(&self) -> KeyexchContext {
        let mut ctx = KeyexchContext::new();
        ctx.init(&self.keyexch, self.key(2), &Params::EMPTY).unwrap();
        ctx.set_peer(self.key(4)).unwrap();
        ctx
    }
}

#[test]
fn sizing_call_reports_without_writing() {
    let fixture = Fixture::new();
    let mut ctx = fixture.ready_context();

    let size = ctx.derive(None).unwrap();
    assert!(size > 0);
    assert_eq!(size, 1, "stripped encoding of a one-byte secret");
}

#[test]
fn padding_toggles_output_width() {
    let fixture = Fixture::new();
    let mut ctx = fixture.ready_context();

    // stripped by convention: the leading zero of the two-byte encoding
    // is dropped
    assert_eq!(ctx.derive_vec().unwrap(), vec![0x01]);

    // padded to the full modulus width, leading zero intact
    ctx.set_params(&Params::new().with("pad", ParamValue::Uint(1))).unwrap();
    let padded = ctx.derive_vec().unwrap();
    assert_eq!(padded, vec![0x00, 0x01]);

    ctx.set_params(&Params::new().with("pad", ParamValue::Uint(0))).unwrap();
    assert_eq!(ctx.derive_vec().unwrap(), vec![0x01]);
}

#[test]
fn short_buffers_fail_without_writing() {
    let fixture = Fixture::new();
    let mut ctx = fixture.ready_context();
    ctx.set_params(&Params::new().with("pad", ParamValue::Uint(1))).unwrap();

    let mut short = [0u8; 1];
    assert_eq!(
        ctx.derive(Some(&mut short)),
        Err(Error::BufferTooSmall { need: 2, got: 1 }),
    );
    assert_eq!(short, [0u8; 1]);
}

#[test]
fn derive_requires_init_and_peer() {
    let fixture = Fixture::new();

    let mut ctx = KeyexchContext::new();
    assert!(matches!(ctx.derive(None), Err(Error::Misuse(_))));
    assert!(matches!(ctx.set_peer(fixture.key(4)), Err(Error::Misuse(_))));

    ctx.init(&fixture.keyexch, fixture.key(2), &Params::EMPTY).unwrap();
    assert!(matches!(ctx.derive(None), Err(Error::Misuse(_))), "peer still missing");

    ctx.set_peer(fixture.key(4)).unwrap();
    assert!(ctx.derive(None).is_ok());
}

#[test]
fn dup_shares_no_state_but_agrees_on_the_secret() {
    let fixture = Fixture::new();
    let mut ctx = fixture.ready_context();
    let mut copy = ctx.dup().unwrap();

    assert_eq!(ctx.derive_vec().unwrap(), copy.derive_vec().unwrap());

    // reconfiguring the copy leaves the original alone
    copy.set_params(&Params::new().with("pad", ParamValue::Uint(1))).unwrap();
    assert_eq!(copy.derive_vec().unwrap(), vec![0x00, 0x01]);
    assert_eq!(ctx.derive_vec().unwrap(), vec![0x01]);
}

#[test]
fn foreign_key_objects_are_provider_errors() {
    let fixture = Fixture::new();

    let mut ctx = KeyexchContext::new();
    // domain parameters are not a key
    let err = ctx
        .init(&fixture.keyexch, fixture.domain.clone(), &Params::EMPTY)
        .unwrap_err();
    assert_eq!(
        err,
        Error::Provider { provider: "soft".to_owned(), reason: support::REASON_FOREIGN_KEY },
    );

    let provider = fixture.keyexch.provider();
    assert_eq!(
        provider.reason_string(support::REASON_FOREIGN_KEY),
        Some("key object from a foreign provider"),
    );
}

#[test]
fn keys_export_through_params() {
    let fixture = Fixture::new();
    let bob = fixture.key(4);

    let mut params = Params::new()
        .request("pub", ParamKind::Bignum)
        .request("p", ParamKind::Uint)
        .request("g", ParamKind::Uint);
    fixture.keymgmt.export_key(&bob, &mut params).unwrap();

    assert_eq!(params.get_bignum("pub"), Some(&[0x01][..]));
    assert_eq!(params.get_uint("p"), Some(support::DH_P));
    assert_eq!(params.get_uint("g"), Some(support::DH_G));

    fixture.keymgmt.free_key(bob);
}

#[test]
fn domain_parameters_export_and_free() {
    let fixture = Fixture::new();

    let mut params = Params::new().request("p", ParamKind::Uint);
    fixture
        .keymgmt
        .export_parameters(&fixture.domain, &mut params)
        .unwrap();
    assert_eq!(params.get_uint("p"), Some(support::DH_P));

    let extra = fixture.keymgmt.generate_parameters(&Params::new()).unwrap();
    fixture.keymgmt.free_parameters(extra);
}

#[test]
fn reinit_resets_the_peer() {
    let fixture = Fixture::new();
    let mut ctx = fixture.ready_context();
    assert!(ctx.derive(None).is_ok());

    // same implementation: the fast path reuses the working state, but the
    // peer must be bound again
    ctx.init(&fixture.keyexch, fixture.key(6), &Params::EMPTY).unwrap();
    assert!(matches!(ctx.derive(None), Err(Error::Misuse(_))));

    ctx.set_peer(fixture.key(4)).unwrap();
    assert!(ctx.derive(None).is_ok());

    let _ = fixture.libctx;
}
