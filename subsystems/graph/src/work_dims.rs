//! Launch geometry: global and local work sizes to group count and size.

use replay_hal::{Error, GroupCount, GroupSize, KernelHandle, NativeDevice, Result};

/// Group count and group size for a launch
///
/// Dimensions past `work_dim` are 1. Without a local size the driver's
/// suggestion for the kernel is used.
pub fn calculate(
    native: &dyn NativeDevice,
    kernel: KernelHandle,
    work_dim: u32,
    global: &[u64; 3],
    local: Option<&[u64; 3]>,
) -> Result<(GroupCount, GroupSize)> {
    calculate_with(work_dim, global, local, |global| native.suggest_group_size(kernel, global))
}

pub(crate) fn calculate_with<F>(
    work_dim: u32,
    global: &[u64; 3],
    local: Option<&[u64; 3]>,
    suggest: F,
) -> Result<(GroupCount, GroupSize)>
where
    F: FnOnce([u32; 3]) -> Result<GroupSize>,
{
    if !(1..=3).contains(&work_dim) {
        return Err(Error::InvalidWorkDimension);
    }
    let dims = work_dim as usize;

    let mut global3 = [1u32; 3];
    for (slot, &size) in global3.iter_mut().zip(global).take(dims) {
        *slot = u32::try_from(size).map_err(|_| Error::InvalidValue)?;
        if *slot == 0 {
            return Err(Error::InvalidValue);
        }
    }

    let group = match local {
        Some(local) => {
            let mut size = [1u32; 3];
            for (slot, &l) in size.iter_mut().zip(local).take(dims) {
                *slot = u32::try_from(l).map_err(|_| Error::InvalidWorkGroupSize)?;
            }
            size
        }
        None => suggest(global3)?.to_array(),
    };

    let mut count = [1u32; 3];
    for i in 0..3 {
        if group[i] == 0 || global3[i] % group[i] != 0 {
            log::debug!(
                "global size {:?} not divisible by group size {:?}",
                global3,
                group
            );
            return Err(Error::InvalidWorkGroupSize);
        }
        count[i] = global3[i] / group[i];
    }

    Ok((
        GroupCount::new(count[0], count[1], count[2]),
        GroupSize::new(group[0], group[1], group[2]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_suggestion(_: [u32; 3]) -> Result<GroupSize> {
        panic!("suggestion not expected")
    }

    #[test]
    fn test_explicit_local_size() {
        let (count, size) = calculate_with(2, &[64, 8, 99], Some(&[16, 4, 99]), no_suggestion).unwrap();
        assert_eq!(size, GroupSize::new(16, 4, 1));
        assert_eq!(count, GroupCount::new(4, 2, 1));
    }

    #[test]
    fn test_suggested_local_size() {
        let (count, size) = calculate_with(1, &[96, 0, 0], None, |global| {
            assert_eq!(global, [96, 1, 1]);
            Ok(GroupSize::new(32, 1, 1))
        })
        .unwrap();
        assert_eq!(size, GroupSize::new(32, 1, 1));
        assert_eq!(count, GroupCount::new(3, 1, 1));
    }

    #[test]
    fn test_rejections() {
        assert_eq!(
            calculate_with(0, &[1, 1, 1], None, no_suggestion),
            Err(Error::InvalidWorkDimension)
        );
        assert_eq!(
            calculate_with(4, &[1, 1, 1], None, no_suggestion),
            Err(Error::InvalidWorkDimension)
        );
        assert_eq!(
            calculate_with(1, &[u64::from(u32::MAX) + 1, 1, 1], None, no_suggestion),
            Err(Error::InvalidValue)
        );
        assert_eq!(
            calculate_with(1, &[10, 1, 1], Some(&[4, 1, 1]), no_suggestion),
            Err(Error::InvalidWorkGroupSize)
        );
        assert_eq!(
            calculate_with(1, &[10, 1, 1], Some(&[0, 1, 1]), no_suggestion),
            Err(Error::InvalidWorkGroupSize)
        );
    }
}
