//! Pixel data on a geobox

use crate::error::{Error, Result};
use crate::raster::{GeoBox, RasterElement};
use ndarray::{Array2, Zip};

/// Pixels of type `T` laid out on a [`GeoBox`].
///
/// The array shape always equals the geobox shape; every constructor checks
/// it. `nodata` is the sentinel for missing pixels (NaN is always missing
/// for floats regardless of the sentinel).
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    data: Array2<T>,
    geobox: GeoBox,
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    /// All zeros
    pub fn new(geobox: GeoBox) -> Self {
        Self::filled(geobox, T::zero())
    }

    pub fn filled(geobox: GeoBox, value: T) -> Self {
        Self {
            data: Array2::from_elem(geobox.shape(), value),
            geobox,
            nodata: None,
        }
    }

    /// From row-major pixels
    pub fn from_vec(data: Vec<T>, geobox: GeoBox) -> Result<Self> {
        let (rows, cols) = geobox.shape();
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        let data = Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
        Self::from_array(data, geobox)
    }

    pub fn from_array(data: Array2<T>, geobox: GeoBox) -> Result<Self> {
        let (er, ec) = geobox.shape();
        let (ar, ac) = data.dim();
        if (er, ec) != (ar, ac) {
            return Err(Error::SizeMismatch { er, ec, ar, ac });
        }
        Ok(Self {
            data,
            geobox,
            nodata: None,
        })
    }

    pub fn with_nodata(mut self, nodata: Option<T>) -> Self {
        self.nodata = nodata;
        self
    }

    /// Per-pixel conversion onto the same geobox. The result has no sentinel;
    /// `f` decides what missing input becomes.
    pub fn map<U: RasterElement>(&self, f: impl Fn(T) -> U) -> Raster<U> {
        Raster {
            data: self.data.mapv(f),
            geobox: self.geobox.clone(),
            nodata: None,
        }
    }

    /// Per-pixel combination of two rasters on the same geobox
    pub fn zip_map<U: RasterElement, V: RasterElement>(
        &self,
        other: &Raster<U>,
        f: impl Fn(T, U) -> V,
    ) -> Result<Raster<V>> {
        self.check_aligned(other)?;
        let data = Zip::from(&self.data).and(&other.data).map_collect(|&a, &b| f(a, b));
        Raster::from_array(data, self.geobox.clone())
    }

    pub fn check_aligned<U: RasterElement>(&self, other: &Raster<U>) -> Result<()> {
        if self.geobox == other.geobox {
            Ok(())
        } else {
            Err(Error::GeoBoxMismatch(
                self.geobox.to_string(),
                other.geobox.to_string(),
            ))
        }
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    fn checked(&self, row: usize, col: usize) -> Result<(usize, usize)> {
        let (rows, cols) = self.shape();
        if row < rows && col < cols {
            Ok((row, col))
        } else {
            Err(Error::IndexOutOfBounds { row, col, rows, cols })
        }
    }

    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        let idx = self.checked(row, col)?;
        Ok(self.data[idx])
    }

    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        let idx = self.checked(row, col)?;
        self.data[idx] = value;
        Ok(())
    }

    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    pub fn geobox(&self) -> &GeoBox {
        &self.geobox
    }

    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// Whether `value` counts as missing in this raster
    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }

    /// Pixels that are not missing
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&v| !self.is_nodata(v)).count()
    }
}
