// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ownership mappers that present files as owned by whoever asks

use fsb_core::{Context, NameMapper};
use std::sync::Arc;

/// Maps any owner to the uid of the requesting process, or to an empty
/// string when the request carries no caller.
pub fn mirror_owner() -> NameMapper {
    Arc::new(|ctx: &Context, _owner: &str| ctx.caller().map(|caller| caller.uid.to_string()).unwrap_or_default())
}

/// Maps any group to the gid of the requesting process, or to an empty
/// string when the request carries no caller.
pub fn mirror_group() -> NameMapper {
    Arc::new(|ctx: &Context, _group: &str| ctx.caller().map(|caller| caller.gid.to_string()).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsb_core::Caller;

    #[test]
    fn test_mirror_with_caller() {
        let ctx = Context::for_caller(Caller { uid: 1001, gid: 27, pid: 9 });
        assert_eq!(mirror_owner()(&ctx, "root"), "1001");
        assert_eq!(mirror_group()(&ctx, "wheel"), "27");
    }

    #[test]
    fn test_mirror_without_caller() {
        let ctx = Context::new();
        assert_eq!(mirror_owner()(&ctx, "root"), "");
        assert_eq!(mirror_group()(&ctx, "wheel"), "");
    }
}
