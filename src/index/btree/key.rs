/// Fixed-width keys stored inline in tree pages.
pub trait IndexKey:
    Copy + Ord + Default + std::fmt::Debug + Send + Sync + 'static
{
    const SIZE: usize;

    fn write_to(&self, buf: &mut [u8]);
    fn read_from(buf: &[u8]) -> Self;
}

macro_rules! fixed_width_key {
    ($($t:ty),*) => {
        $(
            impl IndexKey for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn write_to(&self, buf: &mut [u8]) {
                    buf[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                fn read_from(buf: &[u8]) -> Self {
                    <$t>::from_le_bytes(buf[..Self::SIZE].try_into().unwrap())
                }
            }
        )*
    };
}

fixed_width_key!(i32, i64, u32, u64);
