// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Native entry point table.
//!
//! The core never opens a shared library itself. A [`LibraryLoader`]
//! (windowing shim, `dlopen` wrapper, test mock, ...) hands back a
//! [`NativeTable`] of typed, callable symbols and the rest of the crate
//! only goes through [`NativeTable::call`].

use crate::error::{AbiError, AbiResult};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Opaque native object handle (device, adapter, buffer...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NativeHandle(usize);

impl NativeHandle {
    pub const NULL: Self = Self(0);

    pub fn from_address(address: usize) -> Self {
        Self(address)
    }

    pub fn address(self) -> usize {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Argument / return kinds a native symbol can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeType {
    Void,
    Pointer,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    Usize,
}

/// A concrete argument or return value crossing the native boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeArg {
    Void,
    Pointer(usize),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Usize(usize),
}

impl NativeArg {
    pub fn native_type(&self) -> NativeType {
        match self {
            Self::Void => NativeType::Void,
            Self::Pointer(_) => NativeType::Pointer,
            Self::U32(_) => NativeType::U32,
            Self::I32(_) => NativeType::I32,
            Self::U64(_) => NativeType::U64,
            Self::I64(_) => NativeType::I64,
            Self::F32(_) => NativeType::F32,
            Self::F64(_) => NativeType::F64,
            Self::Usize(_) => NativeType::Usize,
        }
    }

    pub fn ptr<T>(p: *const T) -> Self {
        Self::Pointer(p as usize)
    }

    /// The pointer payload, if this is a pointer argument.
    pub fn as_pointer(&self) -> Option<usize> {
        match self {
            Self::Pointer(p) => Some(*p),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::U32(v) => Some(*v),
            _ => None,
        }
    }
}

/// Declared shape of a native symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeSignature {
    pub name: String,
    pub args: Vec<NativeType>,
    pub ret: NativeType,
}

impl NativeSignature {
    pub fn new(name: impl Into<String>, args: &[NativeType], ret: NativeType) -> Self {
        Self {
            name: name.into(),
            args: args.to_vec(),
            ret,
        }
    }
}

/// Callable provided by the loader for one symbol.
pub type NativeFn = Rc<dyn Fn(&[NativeArg]) -> NativeArg>;

struct NativeSymbol {
    signature: NativeSignature,
    func: NativeFn,
}

/// Table of native entry points, keyed by symbol name.
#[derive(Default)]
pub struct NativeTable {
    symbols: HashMap<String, NativeSymbol>,
}

impl fmt::Debug for NativeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.symbols.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("NativeTable").field("symbols", &names).finish()
    }
}

impl NativeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a symbol. A later registration under the same name replaces
    /// the earlier one.
    pub fn register(&mut self, signature: NativeSignature, func: NativeFn) {
        self.symbols
            .insert(signature.name.clone(), NativeSymbol { signature, func });
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(
        mut self,
        signature: NativeSignature,
        func: impl Fn(&[NativeArg]) -> NativeArg + 'static,
    ) -> Self {
        self.register(signature, Rc::new(func));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn signature(&self, name: &str) -> Option<&NativeSignature> {
        self.symbols.get(name).map(|s| &s.signature)
    }

    /// Check that `name` exists and accepts `args`, without calling it.
    pub fn check(&self, name: &str, args: &[NativeArg]) -> AbiResult<()> {
        self.checked_symbol(name, args).map(|_| ())
    }

    fn checked_symbol(&self, name: &str, args: &[NativeArg]) -> AbiResult<&NativeSymbol> {
        let symbol = self
            .symbols
            .get(name)
            .ok_or_else(|| AbiError::MissingSymbol(name.to_string()))?;
        let sig = &symbol.signature;

        if sig.args.len() != args.len() {
            return Err(AbiError::SignatureMismatch {
                symbol: name.to_string(),
                reason: format!("expected {} arguments, got {}", sig.args.len(), args.len()),
            });
        }
        for (i, (expected, arg)) in sig.args.iter().zip(args).enumerate() {
            if *expected != arg.native_type() {
                return Err(AbiError::SignatureMismatch {
                    symbol: name.to_string(),
                    reason: format!(
                        "argument {} expected {:?}, got {:?}",
                        i,
                        expected,
                        arg.native_type()
                    ),
                });
            }
        }
        Ok(symbol)
    }

    /// Call a symbol after checking arity and argument kinds.
    ///
    /// A `SignatureMismatch` on the return value is reported after the
    /// symbol has run; every other error means it was never called.
    pub fn call(&self, name: &str, args: &[NativeArg]) -> AbiResult<NativeArg> {
        let symbol = self.checked_symbol(name, args)?;
        let sig = &symbol.signature;

        log::trace!("native call {}({:?})", name, args);
        let ret = (symbol.func)(args);
        if ret.native_type() != sig.ret {
            return Err(AbiError::SignatureMismatch {
                symbol: name.to_string(),
                reason: format!("returned {:?}, declared {:?}", ret.native_type(), sig.ret),
            });
        }
        Ok(ret)
    }
}

/// Locates and opens a native library, returning its symbol table.
pub trait LibraryLoader {
    fn load(&self) -> AbiResult<NativeTable>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_table() -> NativeTable {
        NativeTable::new().with(
            NativeSignature::new("add", &[NativeType::U32, NativeType::U32], NativeType::U32),
            |args| match (args[0], args[1]) {
                (NativeArg::U32(a), NativeArg::U32(b)) => NativeArg::U32(a + b),
                _ => NativeArg::Void,
            },
        )
    }

    #[test]
    fn test_call_checks_signature() {
        let table = add_table();
        assert_eq!(
            table.call("add", &[NativeArg::U32(2), NativeArg::U32(3)]),
            Ok(NativeArg::U32(5))
        );

        let err = table.call("add", &[NativeArg::U32(2)]).unwrap_err();
        assert!(matches!(err, AbiError::SignatureMismatch { .. }));

        let err = table
            .call("add", &[NativeArg::U32(2), NativeArg::F32(1.0)])
            .unwrap_err();
        assert!(matches!(err, AbiError::SignatureMismatch { .. }));
    }

    #[test]
    fn test_check_does_not_call() {
        let calls = Rc::new(std::cell::Cell::new(0));
        let counter = Rc::clone(&calls);
        let table = NativeTable::new().with(
            NativeSignature::new("tick", &[NativeType::Pointer], NativeType::Void),
            move |_| {
                counter.set(counter.get() + 1);
                NativeArg::Void
            },
        );
        assert!(table.check("tick", &[NativeArg::Pointer(0)]).is_ok());
        assert!(table.check("tick", &[]).is_err());
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_missing_symbol() {
        let table = add_table();
        assert_eq!(
            table.call("sub", &[]),
            Err(AbiError::MissingSymbol("sub".into()))
        );
    }

    struct StaticLoader;

    impl LibraryLoader for StaticLoader {
        fn load(&self) -> AbiResult<NativeTable> {
            Ok(add_table())
        }
    }

    #[test]
    fn test_loader_yields_table() {
        let table = StaticLoader.load().expect("load");
        assert!(table.contains("add"));
        assert_eq!(
            table.signature("add").map(|s| s.ret),
            Some(NativeType::U32)
        );
    }

    #[test]
    fn test_handle_null() {
        assert!(NativeHandle::NULL.is_null());
        assert!(!NativeHandle::from_address(0x1000).is_null());
    }
}
