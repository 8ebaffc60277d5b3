//! Software providers backing the end-to-end tests: SHA-2 digests on top of
//! the RustCrypto hashers, a toy XOR stream cipher, and a small-modulus
//! Diffie-Hellman keymgmt/keyexch pair.
#![allow(dead_code)]

use purveyor::{
    dispatch::{
        Algorithm, AlgorithmList, CipherFinalFn, CipherFunction, CipherInitFn, CipherUpdateFn,
        CtxDupFn, CtxFreeFn, CtxNewFn, CtxSetParamsFn, DigestFinalFn, DigestFunction,
        DigestInitFn, DigestOneshotFn, DigestUpdateFn, DispatchEntry, KeyHandle,
        KeyexchDeriveFn, KeyexchFunction, KeyexchInitFn, KeyexchSetPeerFn, KeymgmtExportFn,
        KeymgmtFreeFn, KeymgmtFunction, KeymgmtGenFn, KeymgmtGenKeyFn, Opaque, Operation,
        ProviderFunction, ProviderGetParamsFn, ProviderQueryFn, ProviderReasonsFn,
        ProviderTeardownFn, SizeFn,
    },
    params::{ParamValue, Params},
    provider::CoreHandle,
    Error, Result,
};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use std::sync::Arc;

/// Reason code the DH bodies report for key objects they did not mint.
pub const REASON_FOREIGN_KEY: u32 = 1;

/// Installs a fmt subscriber once per test binary so fetch-path events show
/// up under `--nocapture`.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

// --- digests -------------------------------------------------------------

struct ShaState<D>(D);

impl<D: Send + Sync + 'static> Opaque for ShaState<D> {}

fn sha_dispatch<D>(block_size: usize) -> Vec<DispatchEntry>
where
    D: Digest + Clone + Default + Send + Sync + 'static,
{
    let size = D::output_size();
    vec![
        DispatchEntry::new(
            DigestFunction::NewCtx,
            CtxNewFn::new(|| {
                let state: Box<dyn Opaque> = Box::new(ShaState(D::new()));
                Ok(state)
            }),
        ),
        DispatchEntry::new(
            DigestFunction::Init,
            DigestInitFn::new(|state, _params| {
                let state = state.downcast_mut::<ShaState<D>>().unwrap();
                state.0 = D::new();
                Ok(())
            }),
        ),
        DispatchEntry::new(
            DigestFunction::Update,
            DigestUpdateFn::new(|state, data| {
                let state = state.downcast_mut::<ShaState<D>>().unwrap();
                state.0.update(data);
                Ok(())
            }),
        ),
        DispatchEntry::new(
            DigestFunction::Final,
            DigestFinalFn::new(move |state, out| {
                let state = state.downcast_mut::<ShaState<D>>().unwrap();
                let digest = state.0.finalize_reset();
                out[..size].copy_from_slice(digest.as_slice());
                Ok(size)
            }),
        ),
        DispatchEntry::new(DigestFunction::FreeCtx, CtxFreeFn::new(|_| ())),
        DispatchEntry::new(
            DigestFunction::DupCtx,
            CtxDupFn::new(|state| {
                let state = state.downcast_ref::<ShaState<D>>().unwrap();
                let copy: Box<dyn Opaque> = Box::new(ShaState(state.0.clone()));
                Ok(copy)
            }),
        ),
        DispatchEntry::new(DigestFunction::Size, SizeFn::new(move || size)),
        DispatchEntry::new(DigestFunction::BlockSize, SizeFn::new(move || block_size)),
    ]
}

/// A digest that only implements the single-shot slot, exercising the
/// envelope's buffering path.
fn oneshot_sha256_dispatch() -> Vec<DispatchEntry> {
    vec![
        DispatchEntry::new(
            DigestFunction::Digest,
            DigestOneshotFn::new(|data, out| {
                let digest = Sha256::digest(data);
                let digest = digest.as_slice();
                out[..digest.len()].copy_from_slice(digest);
                Ok(digest.len())
            }),
        ),
        DispatchEntry::new(DigestFunction::Size, SizeFn::new(|| 32)),
    ]
}

// --- XOR stream cipher ---------------------------------------------------

#[derive(Clone)]
struct XorState {
    key: Vec<u8>,
    pos: usize,
}

impl Opaque for XorState {}

fn xor_init(state: &mut dyn Opaque, key: &[u8], _iv: &[u8], _params: &Params) -> Result<()> {
    let state = state.downcast_mut::<XorState>().unwrap();
    state.key = key.to_vec();
    state.pos = 0;
    Ok(())
}

fn xor_dispatch() -> Vec<DispatchEntry> {
    vec![
        DispatchEntry::new(
            CipherFunction::NewCtx,
            CtxNewFn::new(|| {
                let state: Box<dyn Opaque> = Box::new(XorState { key: Vec::new(), pos: 0 });
                Ok(state)
            }),
        ),
        DispatchEntry::new(CipherFunction::EncryptInit, CipherInitFn::new(xor_init)),
        DispatchEntry::new(CipherFunction::DecryptInit, CipherInitFn::new(xor_init)),
        DispatchEntry::new(
            CipherFunction::Update,
            CipherUpdateFn::new(|state, out, input| {
                let state = state.downcast_mut::<XorState>().unwrap();
                if state.key.is_empty() {
                    return Err(Error::Misuse("update before keying"));
                }
                if out.len() < input.len() {
                    return Err(Error::BufferTooSmall { need: input.len(), got: out.len() });
                }
                for (slot, byte) in out.iter_mut().zip(input) {
                    *slot = byte ^ state.key[state.pos % state.key.len()];
                    state.pos += 1;
                }
                Ok(input.len())
            }),
        ),
        DispatchEntry::new(CipherFunction::Final, CipherFinalFn::new(|_, _| Ok(0))),
        DispatchEntry::new(CipherFunction::FreeCtx, CtxFreeFn::new(|_| ())),
        DispatchEntry::new(
            CipherFunction::DupCtx,
            CtxDupFn::new(|state| {
                let state = state.downcast_ref::<XorState>().unwrap();
                let copy: Box<dyn Opaque> = Box::new(state.clone());
                Ok(copy)
            }),
        ),
    ]
}

// --- small-modulus Diffie-Hellman ---------------------------------------

/// Largest 16-bit prime; two-byte modulus keeps the padding scenario easy
/// to force.
pub const DH_P: u64 = 65521;
/// Generator of the order-2 subgroup, so shared secrets land in
/// `{1, DH_P - 1}`.
pub const DH_G: u64 = DH_P - 1;

struct DhParams {
    p: u64,
    g: u64,
}

impl Opaque for DhParams {}

struct DhKey {
    p: u64,
    g: u64,
    private: u64,
    public: u64,
}

impl Opaque for DhKey {}

#[derive(Clone)]
struct DhExchange {
    p: u64,
    private: Option<u64>,
    peer_public: Option<u64>,
    pad: bool,
}

impl Opaque for DhExchange {}

fn modpow(base: u64, mut exp: u64, modulus: u64) -> u64 {
    let modulus = u128::from(modulus);
    let mut base = u128::from(base) % modulus;
    let mut acc: u128 = 1;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = acc * base % modulus;
        }
        base = base * base % modulus;
        exp >>= 1;
    }
    acc as u64
}

fn modulus_len(p: u64) -> usize {
    ((64 - p.leading_zeros() as usize) + 7) / 8
}

fn secret_bytes(secret: u64, p: u64, pad: bool) -> Vec<u8> {
    let width = modulus_len(p);
    let full = secret.to_be_bytes();
    let full = &full[full.len() - width..];
    if pad {
        full.to_vec()
    } else {
        let zeros = full.iter().take_while(|&&b| b == 0).count();
        full[zeros.min(width - 1)..].to_vec()
    }
}

fn foreign_key() -> Error {
    Error::Provider { provider: "soft".to_owned(), reason: REASON_FOREIGN_KEY }
}

fn dh_keymgmt_dispatch() -> Vec<DispatchEntry> {
    vec![
        DispatchEntry::new(
            KeymgmtFunction::GenParams,
            KeymgmtGenFn::new(|params| {
                let p = params.get_uint("p").unwrap_or(DH_P);
                let g = params.get_uint("g").unwrap_or(DH_G);
                let handle: KeyHandle = Arc::new(DhParams { p, g });
                Ok(handle)
            }),
        ),
        DispatchEntry::new(
            KeymgmtFunction::ExportParams,
            KeymgmtExportFn::new(|object, params| {
                let object = object.downcast_ref::<DhParams>().ok_or_else(foreign_key)?;
                params.fill("p", ParamValue::Uint(object.p));
                params.fill("g", ParamValue::Uint(object.g));
                Ok(())
            }),
        ),
        DispatchEntry::new(KeymgmtFunction::FreeParams, KeymgmtFreeFn::new(|_| ())),
        DispatchEntry::new(
            KeymgmtFunction::GenKey,
            KeymgmtGenKeyFn::new(|base, params| {
                let (p, g) = match base {
                    Some(handle) => {
                        let base = handle.downcast_ref::<DhParams>().ok_or_else(foreign_key)?;
                        (base.p, base.g)
                    }
                    None => (
                        params.get_uint("p").unwrap_or(DH_P),
                        params.get_uint("g").unwrap_or(DH_G),
                    ),
                };
                let private = params
                    .get_uint("priv")
                    .ok_or_else(|| Error::MissingParam("priv".to_owned()))?;
                let public = modpow(g, private, p);
                let handle: KeyHandle = Arc::new(DhKey { p, g, private, public });
                Ok(handle)
            }),
        ),
        DispatchEntry::new(
            KeymgmtFunction::ExportKey,
            KeymgmtExportFn::new(|object, params| {
                let key = object.downcast_ref::<DhKey>().ok_or_else(foreign_key)?;
                params.fill("p", ParamValue::Uint(key.p));
                params.fill("g", ParamValue::Uint(key.g));
                params.fill("priv", ParamValue::bignum(key.private.to_be_bytes().to_vec()));
                params.fill("pub", ParamValue::bignum(key.public.to_be_bytes().to_vec()));
                Ok(())
            }),
        ),
        DispatchEntry::new(KeymgmtFunction::FreeKey, KeymgmtFreeFn::new(|_| ())),
    ]
}

fn dh_keyexch_dispatch() -> Vec<DispatchEntry> {
    vec![
        DispatchEntry::new(
            KeyexchFunction::NewCtx,
            CtxNewFn::new(|| {
                let state: Box<dyn Opaque> =
                    Box::new(DhExchange { p: 0, private: None, peer_public: None, pad: false });
                Ok(state)
            }),
        ),
        DispatchEntry::new(
            KeyexchFunction::Init,
            KeyexchInitFn::new(|state, key, params| {
                let state = state.downcast_mut::<DhExchange>().unwrap();
                let key = key.downcast_arc::<DhKey>().map_err(|_| foreign_key())?;
                state.p = key.p;
                state.private = Some(key.private);
                state.peer_public = None;
                if let Some(pad) = params.get_uint("pad") {
                    state.pad = pad != 0;
                }
                Ok(())
            }),
        ),
        DispatchEntry::new(
            KeyexchFunction::SetPeer,
            KeyexchSetPeerFn::new(|state, key| {
                let state = state.downcast_mut::<DhExchange>().unwrap();
                let key = key.downcast_arc::<DhKey>().map_err(|_| foreign_key())?;
                state.peer_public = Some(key.public);
                Ok(())
            }),
        ),
        DispatchEntry::new(
            KeyexchFunction::Derive,
            KeyexchDeriveFn::new(|state, out| {
                let state = state.downcast_mut::<DhExchange>().unwrap();
                let private = state.private.ok_or(Error::Misuse("derive before init"))?;
                let peer = state
                    .peer_public
                    .ok_or(Error::Misuse("derive before set_peer"))?;
                let secret = secret_bytes(modpow(peer, private, state.p), state.p, state.pad);
                match out {
                    None => Ok(secret.len()),
                    Some(buf) => {
                        if buf.len() < secret.len() {
                            return Err(Error::BufferTooSmall {
                                need: secret.len(),
                                got: buf.len(),
                            });
                        }
                        buf[..secret.len()].copy_from_slice(&secret);
                        Ok(secret.len())
                    }
                }
            }),
        ),
        DispatchEntry::new(KeyexchFunction::FreeCtx, CtxFreeFn::new(|_| ())),
        DispatchEntry::new(
            KeyexchFunction::DupCtx,
            CtxDupFn::new(|state| {
                let state = state.downcast_ref::<DhExchange>().unwrap();
                let copy: Box<dyn Opaque> = Box::new(state.clone());
                Ok(copy)
            }),
        ),
        DispatchEntry::new(
            KeyexchFunction::SetCtxParams,
            CtxSetParamsFn::new(|state, params| {
                let state = state.downcast_mut::<DhExchange>().unwrap();
                if let Some(pad) = params.get_uint("pad") {
                    state.pad = pad != 0;
                }
                Ok(())
            }),
        ),
    ]
}

// --- the providers -------------------------------------------------------

struct SoftCtx;
impl Opaque for SoftCtx {}

/// The primary software provider: three streaming SHA-2 digests (SHA-256
/// tagged `fips=yes`), the XOR cipher, and the DH pair.
pub fn soft_init(_core: &CoreHandle) -> Result<(Vec<DispatchEntry>, Arc<dyn Opaque>)> {
    let table = vec![
        DispatchEntry::new(
            ProviderFunction::QueryOperation,
            ProviderQueryFn::new(|_, operation| {
                AlgorithmList::new(match operation {
                    Operation::Digest => vec![
                        Algorithm::new(
                            "SHA2-256:SHA-256:SHA256",
                            "provider=soft,fips=yes",
                            sha_dispatch::<Sha256>(64),
                        ),
                        Algorithm::new(
                            "SHA2-384:SHA-384",
                            "provider=soft,fips=yes",
                            sha_dispatch::<Sha384>(128),
                        ),
                        Algorithm::new(
                            "SHA2-512:SHA-512",
                            "provider=soft,fips=yes",
                            sha_dispatch::<Sha512>(128),
                        ),
                    ],
                    Operation::Cipher => vec![Algorithm::new(
                        "XOR",
                        "provider=soft",
                        xor_dispatch(),
                    )],
                    Operation::Keymgmt => vec![Algorithm::new(
                        "DH",
                        "provider=soft",
                        dh_keymgmt_dispatch(),
                    )],
                    Operation::Keyexch => vec![Algorithm::new(
                        "DH",
                        "provider=soft",
                        dh_keyexch_dispatch(),
                    )],
                })
            }),
        ),
        DispatchEntry::new(
            ProviderFunction::GetParams,
            ProviderGetParamsFn::new(|_, params| {
                params.fill("name", ParamValue::Utf8("soft".to_owned()));
                params.fill("version", ParamValue::Utf8("1.0".to_owned()));
                params.fill("status", ParamValue::Utf8("active".to_owned()));
                Ok(())
            }),
        ),
        DispatchEntry::new(
            ProviderFunction::GetReasonStrings,
            ProviderReasonsFn::new(|| {
                vec![(REASON_FOREIGN_KEY, "key object from a foreign provider")]
            }),
        ),
        DispatchEntry::new(ProviderFunction::Teardown, ProviderTeardownFn::new(|_| Ok(()))),
    ];
    Ok((table, Arc::new(SoftCtx)))
}

/// A second provider overlapping on SHA-256 (tagged `fips=no`) and SHA-512,
/// plus SHA-224, for selection and do-all coverage.
pub fn alt_init(_core: &CoreHandle) -> Result<(Vec<DispatchEntry>, Arc<dyn Opaque>)> {
    let table = vec![DispatchEntry::new(
        ProviderFunction::QueryOperation,
        ProviderQueryFn::new(|_, operation| {
            AlgorithmList::new(match operation {
                Operation::Digest => vec![
                    Algorithm::new(
                        "SHA2-224:SHA-224",
                        "provider=alt,fips=no",
                        sha_dispatch::<Sha224>(64),
                    ),
                    Algorithm::new(
                        "SHA2-256:SHA-256:SHA256",
                        "provider=alt,fips=no",
                        sha_dispatch::<Sha256>(64),
                    ),
                    Algorithm::new(
                        "SHA2-512:SHA-512",
                        "provider=alt,fips=no",
                        sha_dispatch::<Sha512>(128),
                    ),
                ],
                _ => vec![],
            })
        }),
    )];
    Ok((table, Arc::new(SoftCtx)))
}

/// A provider whose digests are offered with `no_store`: resolutions are
/// handed out but never promoted or cached.
pub fn ephemeral_init(_core: &CoreHandle) -> Result<(Vec<DispatchEntry>, Arc<dyn Opaque>)> {
    let table = vec![DispatchEntry::new(
        ProviderFunction::QueryOperation,
        ProviderQueryFn::new(|_, operation| {
            let mut list = AlgorithmList::new(match operation {
                Operation::Digest => vec![Algorithm::new(
                    "FLEETING-256",
                    "provider=ephemeral",
                    sha_dispatch::<Sha256>(64),
                )],
                _ => vec![],
            });
            list.no_store = true;
            list
        }),
    )];
    Ok((table, Arc::new(SoftCtx)))
}

/// A provider exposing the single-shot-only SHA-256 plus a deliberately
/// incomplete digest (no `size` slot).
pub fn quirky_init(_core: &CoreHandle) -> Result<(Vec<DispatchEntry>, Arc<dyn Opaque>)> {
    let table = vec![DispatchEntry::new(
        ProviderFunction::QueryOperation,
        ProviderQueryFn::new(|_, operation| {
            AlgorithmList::new(match operation {
                Operation::Digest => vec![
                    Algorithm::new("ONESHOT-256", "provider=quirky", oneshot_sha256_dispatch()),
                    Algorithm::new("SIZELESS", "provider=quirky", {
                        let mut table = oneshot_sha256_dispatch();
                        table.retain(|e| e.id() != u32::from(DigestFunction::Size));
                        table
                    }),
                ],
                _ => vec![],
            })
        }),
    )];
    Ok((table, Arc::new(SoftCtx)))
}

/// SHA-256 of `"abc"`, the fixed vector used by the round-trip scenario.
pub const SHA256_ABC: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

/// Hex-encodes for comparison against fixed vectors.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
