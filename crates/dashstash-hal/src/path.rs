/// Partition path helper for block devices. Handles loop/nvme/mmcblk postfixing.
pub fn partition_path(disk: &str, num: u32) -> String {
    if disk.contains("loop") || disk.contains("nvme") || disk.contains("mmcblk") {
        format!("{}p{}", disk, num)
    } else {
        format!("{}{}", disk, num)
    }
}

/// Strip a trailing partition suffix (`/dev/loop0p1` -> `/dev/loop0`).
///
/// Whole devices (`/dev/loop7`, `/dev/sda`) are returned unchanged.
pub fn parent_device(partition: &str) -> String {
    let head = partition.trim_end_matches(|c: char| c.is_ascii_digit());
    if head.len() == partition.len() {
        return partition.to_string();
    }
    if let Some(base) = head.strip_suffix('p') {
        if base.ends_with(|c: char| c.is_ascii_digit()) {
            return base.to_string();
        }
    }
    if partition.contains("loop") || partition.contains("nvme") || partition.contains("mmcblk") {
        return partition.to_string();
    }
    head.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_partitions_use_p_suffix() {
        assert_eq!(partition_path("/dev/loop3", 1), "/dev/loop3p1");
        assert_eq!(partition_path("/dev/sda", 2), "/dev/sda2");
    }

    #[test]
    fn parent_device_strips_partition() {
        assert_eq!(parent_device("/dev/loop0p1"), "/dev/loop0");
        assert_eq!(parent_device("/dev/mmcblk0p2"), "/dev/mmcblk0");
        assert_eq!(parent_device("/dev/sda1"), "/dev/sda");
        assert_eq!(parent_device("/dev/loop7"), "/dev/loop7");
    }
}
